//! Study-file readers (spec §4.A): scan a GWAS/MWAS file for hits passing a
//! p-value cutoff, and later look an individual hit's association back up.

pub mod gwas;
pub mod mwas;
pub mod vcf_hgvs;

use crate::model::Association;

/// Outcome of a `find_significant_hits` scan: either a populated container
/// and a count, or a human-readable reason the scan itself failed (a
/// SEARCHING-class error, spec §7).
pub struct ScanOutcome<C> {
    pub success: bool,
    pub hits: Option<C>,
    pub hit_count: i64,
    pub error_message: Option<String>,
}

impl<C> ScanOutcome<C> {
    pub fn ok(hits: C, hit_count: i64) -> Self {
        Self {
            success: true,
            hits: Some(hits),
            hit_count,
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            hits: None,
            hit_count: 0,
            error_message: Some(error_message.into()),
        }
    }
}

/// Shared contract implemented by [`gwas::GwasReader`] and [`mwas::MwasReader`].
///
/// `Hit` and `Container` are left associated rather than shared generics
/// since the two readers pair genuinely different hit/container types
/// (`GwasHit`/`SequenceVariantContainer` vs `MwasHit`/`MetaboliteContainer`).
pub trait StudyReader {
    type Hit;
    type Container: crate::hits::HitsContainer<Self::Hit>;

    fn find_significant_hits(&self, p_value_cutoff: f64) -> ScanOutcome<Self::Container>;

    fn get_association(&self, hit: &Self::Hit) -> Option<Association>;
}
