//! VCF coordinate → HGVS genomic-expression conversion (spec §4.A).

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::common::GenomeRelease;

/// `(genome, patch, chrom) -> RefSeq accession`.
///
/// A hard-coded table, as spec.md mandates; kept as a lazily-built map
/// rather than a `match` so additional patches can be appended without
/// touching the lookup logic.
fn reference_chrom_labels() -> &'static HashMap<(GenomeRelease, &'static str, &'static str), &'static str> {
    static TABLE: OnceLock<HashMap<(GenomeRelease, &'static str, &'static str), &'static str>> =
        OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m = HashMap::new();
        let hg19_p1: &[(&str, &str)] = &[
            ("1", "NC_000001.10"),
            ("2", "NC_000002.11"),
            ("3", "NC_000003.11"),
            ("4", "NC_000004.11"),
            ("5", "NC_000005.9"),
            ("6", "NC_000006.11"),
            ("7", "NC_000007.13"),
            ("8", "NC_000008.10"),
            ("9", "NC_000009.11"),
            ("10", "NC_000010.10"),
            ("11", "NC_000011.9"),
            ("12", "NC_000012.11"),
            ("13", "NC_000013.10"),
            ("14", "NC_000014.8"),
            ("15", "NC_000015.9"),
            ("16", "NC_000016.9"),
            ("17", "NC_000017.10"),
            ("18", "NC_000018.9"),
            ("19", "NC_000019.9"),
            ("20", "NC_000020.10"),
            ("21", "NC_000021.8"),
            ("22", "NC_000022.10"),
            ("23", "NC_000023.10"),
            ("24", "NC_000024.9"),
            ("X", "NC_000023.10"),
            ("Y", "NC_000024.9"),
        ];
        let hg38_p1: &[(&str, &str)] = &[
            ("1", "NC_000001.11"),
            ("2", "NC_000002.12"),
            ("3", "NC_000003.12"),
            ("4", "NC_000004.12"),
            ("5", "NC_000005.10"),
            ("6", "NC_000006.12"),
            ("7", "NC_000007.14"),
            ("8", "NC_000008.11"),
            ("9", "NC_000009.12"),
            ("10", "NC_000010.11"),
            ("11", "NC_000011.10"),
            ("12", "NC_000012.12"),
            ("13", "NC_000013.11"),
            ("14", "NC_000014.9"),
            ("15", "NC_000015.10"),
            ("16", "NC_000016.10"),
            ("17", "NC_000017.11"),
            ("18", "NC_000018.10"),
            ("19", "NC_000019.10"),
            ("20", "NC_000020.11"),
            ("21", "NC_000021.9"),
            ("22", "NC_000022.11"),
            ("23", "NC_000023.11"),
            ("24", "NC_000024.10"),
            ("X", "NC_000023.11"),
            ("Y", "NC_000024.10"),
        ];
        for (chrom, acc) in hg19_p1 {
            m.insert((GenomeRelease::Hg19, "p1", *chrom), *acc);
        }
        for (chrom, acc) in hg38_p1 {
            m.insert((GenomeRelease::Hg38, "p1", *chrom), *acc);
        }
        m
    })
}

/// Convert `(chrom, pos, ref, alt)` to a `g.`-coordinate HGVS expression.
///
/// Returns an empty string when the accession is unknown or the allele
/// shape isn't one of the recognized substitution/insertion/deletion
/// patterns (spec §4.A) — the caller treats that as "drop this row".
pub fn convert_vcf_to_hgvs(
    reference_genome: GenomeRelease,
    reference_patch: &str,
    chrom: &str,
    pos: i64,
    reference: &str,
    alt: &str,
) -> String {
    let Some(ref_chromosome) = reference_chrom_labels()
        .get(&(reference_genome, reference_patch, chrom))
        .copied()
    else {
        tracing::warn!(
            "Reference chromosome and/or version not found: {:?}.{}, {}",
            reference_genome,
            reference_patch,
            chrom
        );
        return String::new();
    };

    let len_ref = reference.chars().count();

    let variation = if alt == "." {
        if len_ref == 1 {
            format!("{pos}del")
        } else {
            format!("{pos}_{}del", pos + len_ref as i64 - 1)
        }
    } else if alt.starts_with('<') {
        return String::new();
    } else {
        let len_alt = alt.chars().count();
        if len_ref == 1 && len_alt == 1 {
            format!("{pos}{reference}>{alt}")
        } else if len_alt > len_ref && alt.starts_with(reference) {
            let inserted = &alt[len_ref..];
            format!("{}_{}ins{inserted}", pos + len_ref as i64 - 1, pos + len_ref as i64)
        } else if len_ref > len_alt && reference.starts_with(alt) {
            let diff = len_ref - len_alt;
            let offset = len_ref - diff;
            if diff == 1 {
                format!("{}del", pos + offset as i64)
            } else {
                format!("{}_{}del", pos + offset as i64, pos + offset as i64 + diff as i64 - 1)
            }
        } else {
            tracing::warn!(
                "Format of variant not recognized for hgvs conversion: {} to {}",
                reference,
                alt
            );
            return String::new();
        }
    };

    format!("{ref_chromosome}:g.{variation}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn substitution() {
        let hgvs = convert_vcf_to_hgvs(GenomeRelease::Hg19, "p1", "19", 45411941, "T", "C");
        assert_eq!(hgvs, "NC_000019.9:g.45411941T>C");
        assert!(hgvs.ends_with("45411941T>C"));
    }

    #[test]
    fn deletion_multi_base() {
        let hgvs = convert_vcf_to_hgvs(GenomeRelease::Hg19, "p1", "16", 82335280, "AAAC", "A");
        assert_eq!(hgvs, "NC_000016.9:g.82335281_82335283del");
    }

    #[test]
    fn deletion_single_base_dot_alt() {
        let hgvs = convert_vcf_to_hgvs(GenomeRelease::Hg19, "p1", "1", 1000, "A", ".");
        assert_eq!(hgvs, "NC_000001.10:g.1000del");
    }

    #[test]
    fn insertion() {
        let hgvs = convert_vcf_to_hgvs(GenomeRelease::Hg19, "p1", "1", 1000, "A", "ATT");
        assert_eq!(hgvs, "NC_000001.10:g.1000_1001insTT");
    }

    #[test]
    fn unsupported_structural_variant_is_empty() {
        assert_eq!(
            convert_vcf_to_hgvs(GenomeRelease::Hg19, "p1", "1", 1000, "A", "<DEL>"),
            ""
        );
    }

    #[test]
    fn unrecognized_shape_is_empty() {
        // neither allele is a prefix of the other
        assert_eq!(
            convert_vcf_to_hgvs(GenomeRelease::Hg19, "p1", "1", 1000, "AG", "CT"),
            ""
        );
    }

    #[test]
    fn missing_accession_is_empty() {
        assert_eq!(
            convert_vcf_to_hgvs(GenomeRelease::Hg19, "p9", "1", 1000, "A", "T"),
            ""
        );
    }
}
