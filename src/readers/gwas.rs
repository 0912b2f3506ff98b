//! GWAS (whitespace-delimited, optionally gzipped/tabix-indexed) file reader.

use std::fs::File;
use std::io::BufRead;

use crate::common::io::open_read_maybe_gz;
use crate::common::GenomeRelease;
use crate::hits::{HitsContainer, SequenceVariantContainer};
use crate::model::{Association, GwasHit, HitRecord};

use super::{vcf_hgvs::convert_vcf_to_hgvs, ScanOutcome, StudyReader};

const CHROM_LABELS: &[&str] = &["chrom", "chr", "chromosome"];
const POS_LABELS: &[&str] = &["pos", "position"];
const REF_LABELS: &[&str] = &["ref"];
const ALT_LABELS: &[&str] = &["alt"];
const PVAL_LABELS: &[&str] = &["pvalue", "pval", "p_value", "p_val"];
const BETA_LABELS: &[&str] = &["beta"];

#[derive(Debug, Clone)]
pub struct GwasFile {
    pub file_path: String,
    pub has_tabix: bool,
    pub reference_genome: GenomeRelease,
    pub reference_patch: String,
}

impl GwasFile {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            has_tabix: false,
            reference_genome: GenomeRelease::Hg19,
            reference_patch: "p1".to_string(),
        }
    }
}

/// Column positions found by scanning the header line for one of each
/// field's known aliases (the file's columns may be in any order).
#[derive(Debug, Clone, Copy)]
struct ColumnIndices {
    chrom: usize,
    pos: usize,
    reference: usize,
    alt: usize,
    p_value: usize,
    beta: usize,
}

fn find_index(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h == alias))
}

fn read_header_line(file: &GwasFile) -> Result<Vec<String>, anyhow::Error> {
    let mut reader = open_read_maybe_gz(&file.file_path)?;
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.split_whitespace().map(|s| s.to_lowercase()).collect())
}

fn find_columns(file: &GwasFile) -> Result<ColumnIndices, anyhow::Error> {
    let headers = read_header_line(file)?;
    let chrom = find_index(&headers, CHROM_LABELS);
    let pos = find_index(&headers, POS_LABELS);
    let reference = find_index(&headers, REF_LABELS);
    let alt = find_index(&headers, ALT_LABELS);
    let p_value = find_index(&headers, PVAL_LABELS);
    let beta = find_index(&headers, BETA_LABELS);

    match (chrom, pos, reference, alt, p_value, beta) {
        (Some(chrom), Some(pos), Some(reference), Some(alt), Some(p_value), Some(beta)) => {
            Ok(ColumnIndices { chrom, pos, reference, alt, p_value, beta })
        }
        _ => anyhow::bail!("Bad file headers in {} - {:?}", file.file_path, headers),
    }
}

pub struct GwasReader {
    file: GwasFile,
}

impl GwasReader {
    pub fn new(file: GwasFile) -> Self {
        Self { file }
    }

    fn get_association_from_text(&self, columns: ColumnIndices, hit: &GwasHit) -> Option<Association> {
        let reader = open_read_maybe_gz(&self.file.file_path).ok()?;
        let mut lines = reader.lines();
        lines.next(); // header

        for line in lines.map_while(Result::ok) {
            let data: Vec<&str> = line.split_whitespace().collect();
            if data.len() <= columns.beta.max(columns.p_value) {
                continue;
            }
            if data.get(columns.chrom) == Some(&hit.chrom.as_str())
                && data.get(columns.pos).and_then(|p| p.parse::<i64>().ok()) == Some(hit.pos)
                && data.get(columns.reference) == Some(&hit.reference.as_str())
                && data.get(columns.alt) == Some(&hit.alt.as_str())
            {
                return parse_association(data[columns.p_value], data[columns.beta]);
            }
        }
        None
    }

    /// Random-access lookup via the file's accompanying `.tbi` index.
    ///
    /// Tabix's query semantics are half-open on `[start, end)` counted from
    /// zero; the indexed region for one base at `hit.pos` is therefore
    /// `(hit.pos - 1, hit.pos)` in tabix's own coordinates.
    fn get_association_from_tabix(&self, columns: ColumnIndices, hit: &GwasHit) -> Option<Association> {
        let tbi_path = format!("{}.tbi", self.file.file_path);
        let index = noodles_tabix::fs::read(&tbi_path).ok()?;

        let start = noodles_core::Position::try_from((hit.pos - 1).max(1) as usize).ok()?;
        let end = noodles_core::Position::try_from(hit.pos as usize).ok()?;
        let region = noodles_core::Region::new(hit.chrom.clone(), start..=end);

        let file = File::open(&self.file.file_path).ok()?;
        let mut reader = noodles_bgzf::io::Reader::new(file);
        let query = noodles_tabix::io::Query::new(&mut reader, &index, &region).ok()?;

        for result in query {
            let line = result.ok()?;
            let data: Vec<&str> = line.split_whitespace().collect();
            if data.len() <= columns.beta.max(columns.p_value) {
                continue;
            }
            if data.get(columns.alt) == Some(&hit.alt.as_str())
                && data.get(columns.reference) == Some(&hit.reference.as_str())
            {
                return parse_association(data[columns.p_value], data[columns.beta]);
            }
        }
        None
    }
}

fn parse_association(p_value_str: &str, beta_str: &str) -> Option<Association> {
    let mut p_value: f64 = p_value_str.parse().ok()?;
    if p_value == 0.0 {
        p_value = f64::MIN_POSITIVE;
    }
    let beta: f64 = beta_str.parse().ok()?;
    Some(Association { p_value, beta })
}

impl StudyReader for GwasReader {
    type Hit = GwasHit;
    type Container = SequenceVariantContainer;

    fn find_significant_hits(&self, p_value_cutoff: f64) -> ScanOutcome<SequenceVariantContainer> {
        let columns = match find_columns(&self.file) {
            Ok(columns) => columns,
            Err(e) => {
                tracing::error!("{}", e);
                return ScanOutcome::failed(e.to_string());
            }
        };

        let reader = match open_read_maybe_gz(&self.file.file_path) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::error!("Error reading file {}: {}", self.file.file_path, e);
                return ScanOutcome::failed(e.to_string());
            }
        };

        let mut container = SequenceVariantContainer::new();
        let mut sig_variants_found = 0i64;
        let mut sig_variants_failed_conversion = 0i64;
        let mut line_counter = 0i64;

        for line in reader.lines().skip(1) {
            let Ok(line) = line else { continue };
            line_counter += 1;
            let data: Vec<&str> = line.split_whitespace().collect();
            if data.len() <= columns.p_value.max(columns.beta) {
                continue;
            }

            let Ok(p_value) = data[columns.p_value].parse::<f64>() else {
                tracing::error!(
                    "Error reading file {}, on line {}: bad p value",
                    self.file.file_path,
                    line_counter
                );
                continue;
            };

            if p_value <= p_value_cutoff {
                let chrom = data[columns.chrom].to_string();
                let Ok(pos) = data[columns.pos].parse::<i64>() else {
                    tracing::error!(
                        "Error reading file {}, on line {}: bad position",
                        self.file.file_path,
                        line_counter
                    );
                    continue;
                };
                let reference = data[columns.reference].to_string();
                let alt = data[columns.alt].to_string();

                let hgvs = convert_vcf_to_hgvs(
                    self.file.reference_genome,
                    &self.file.reference_patch,
                    &chrom,
                    pos,
                    &reference,
                    &alt,
                );

                if !hgvs.is_empty() {
                    container.add_hit(GwasHit {
                        record: HitRecord::new(hgvs.clone(), None),
                        hgvs,
                        chrom,
                        pos,
                        reference,
                        alt,
                    });
                    sig_variants_found += 1;
                } else {
                    sig_variants_failed_conversion += 1;
                }
            }
        }

        let filename = self.file.file_path.rsplit('/').next().unwrap_or(&self.file.file_path);
        tracing::info!("Finding variants in {} complete. {} lines searched.", filename, line_counter);
        tracing::info!("In {} {} significant variants found and converted.", filename, sig_variants_found);
        if sig_variants_failed_conversion > 0 {
            tracing::error!(
                "In {} {} other significant variants failed to convert to hgvs.",
                filename,
                sig_variants_failed_conversion
            );
        }

        ScanOutcome::ok(container, sig_variants_found)
    }

    fn get_association(&self, hit: &GwasHit) -> Option<Association> {
        let columns = find_columns(&self.file).ok()?;
        if self.file.has_tabix {
            self.get_association_from_tabix(columns, hit)
        } else {
            self.get_association_from_text(columns, hit)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_fixture(tmp_dir: &temp_testdir::TempDir, name: &str, contents: &str) -> String {
        let path = tmp_dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn finds_significant_hits_and_drops_unconvertible_rows() {
        let tmp_dir = temp_testdir::TempDir::default();
        let contents = "chrom\tpos\tref\talt\tpvalue\tbeta\n\
                         19\t45411941\tT\tC\t1e-10\t0.5\n\
                         1\t1000\tA\tT\t0.9\t0.1\n\
                         1\t2000\tA\tT\t1e-8\t0.2\n";
        let path = write_fixture(&tmp_dir, "study.tsv", contents);

        let reader = GwasReader::new(GwasFile::new(path));
        let outcome = reader.find_significant_hits(1e-5);

        assert!(outcome.success);
        assert_eq!(outcome.hit_count, 2);
        let container = outcome.hits.unwrap();
        assert_eq!(container.hit_count(), 2);
    }

    #[test]
    fn reports_bad_headers() {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = write_fixture(&tmp_dir, "study.tsv", "a\tb\tc\n1\t2\t3\n");

        let reader = GwasReader::new(GwasFile::new(path));
        let outcome = reader.find_significant_hits(1e-5);

        assert!(!outcome.success);
        assert!(outcome.hits.is_none());
    }

    #[test]
    fn get_association_from_text_scan() {
        let tmp_dir = temp_testdir::TempDir::default();
        let contents = "chrom\tpos\tref\talt\tpvalue\tbeta\n\
                         1\t2000\tA\tT\t1e-8\t0.2\n";
        let path = write_fixture(&tmp_dir, "study.tsv", contents);

        let reader = GwasReader::new(GwasFile::new(path));
        let hit = GwasHit {
            record: HitRecord::new("ROBO_VAR:x", None),
            hgvs: String::new(),
            chrom: "1".to_string(),
            pos: 2000,
            reference: "A".to_string(),
            alt: "T".to_string(),
        };

        let association = reader.get_association(&hit).unwrap();
        assert_eq!(association.beta, 0.2);
        assert!((association.p_value - 1e-8).abs() < 1e-12);
    }

    #[test]
    fn get_association_clamps_zero_p_value() {
        let tmp_dir = temp_testdir::TempDir::default();
        let contents = "chrom\tpos\tref\talt\tpvalue\tbeta\n\
                         1\t2000\tA\tT\t0\t0.2\n";
        let path = write_fixture(&tmp_dir, "study.tsv", contents);

        let reader = GwasReader::new(GwasFile::new(path));
        let hit = GwasHit {
            record: HitRecord::new("ROBO_VAR:x", None),
            hgvs: String::new(),
            chrom: "1".to_string(),
            pos: 2000,
            reference: "A".to_string(),
            alt: "T".to_string(),
        };

        let association = reader.get_association(&hit).unwrap();
        assert_eq!(association.p_value, f64::MIN_POSITIVE);
    }
}
