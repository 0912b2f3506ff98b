//! Hit containers (spec §4.B): in-memory aggregation of significant rows
//! produced by a single file scan, keyed appropriately per study type.
//!
//! Both containers implement the same iterator contract; iteration order
//! is unspecified but deterministic within one process run (`BTreeMap`
//! gives us that for free, where the source relied on Python's
//! insertion-ordered dicts).

use std::collections::BTreeMap;

use crate::model::{GwasHit, MwasHit};

pub trait HitsContainer<T> {
    fn add_hit(&mut self, hit: T);
    fn iterate(&self) -> Box<dyn Iterator<Item = &T> + '_>;
    fn hit_count(&self) -> usize {
        self.iterate().count()
    }
}

/// `chrom -> pos -> [hit, ...]`, tolerating multi-allelic positions (more
/// than one hit sharing a `(chrom, pos)`).
#[derive(Debug, Default)]
pub struct SequenceVariantContainer {
    variants: BTreeMap<String, BTreeMap<i64, Vec<GwasHit>>>,
}

impl SequenceVariantContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_variant(&self, chrom: &str, pos: i64, reference: &str, alt: &str) -> Option<&GwasHit> {
        self.variants
            .get(chrom)
            .and_then(|by_pos| by_pos.get(&pos))
            .and_then(|hits| hits.iter().find(|h| h.reference == reference && h.alt == alt))
    }
}

impl HitsContainer<GwasHit> for SequenceVariantContainer {
    fn add_hit(&mut self, hit: GwasHit) {
        self.variants
            .entry(hit.chrom.clone())
            .or_default()
            .entry(hit.pos)
            .or_default()
            .push(hit);
    }

    fn iterate(&self) -> Box<dyn Iterator<Item = &GwasHit> + '_> {
        Box::new(
            self.variants
                .values()
                .flat_map(|by_pos| by_pos.values())
                .flat_map(|hits| hits.iter()),
        )
    }
}

/// `original_id -> hit`; duplicate curies in a file naturally collapse to
/// the last-seen row, matching the source's dict-keyed behavior.
#[derive(Debug, Default)]
pub struct MetaboliteContainer {
    metabolites: BTreeMap<String, MwasHit>,
}

impl MetaboliteContainer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HitsContainer<MwasHit> for MetaboliteContainer {
    fn add_hit(&mut self, hit: MwasHit) {
        self.metabolites.insert(hit.record.original_id.clone(), hit);
    }

    fn iterate(&self) -> Box<dyn Iterator<Item = &MwasHit> + '_> {
        Box::new(self.metabolites.values())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::HitRecord;

    fn gwas_hit(chrom: &str, pos: i64, r: &str, a: &str) -> GwasHit {
        GwasHit {
            record: HitRecord::new(format!("{chrom}-{pos}-{r}-{a}"), None),
            hgvs: String::new(),
            chrom: chrom.to_string(),
            pos,
            reference: r.to_string(),
            alt: a.to_string(),
        }
    }

    #[test]
    fn tolerates_multi_allelic_positions() {
        let mut container = SequenceVariantContainer::new();
        container.add_hit(gwas_hit("1", 100, "A", "T"));
        container.add_hit(gwas_hit("1", 100, "A", "G"));

        assert_eq!(container.hit_count(), 2);
        assert!(container.get_variant("1", 100, "A", "T").is_some());
        assert!(container.get_variant("1", 100, "A", "G").is_some());
        assert!(container.get_variant("1", 100, "A", "C").is_none());
    }

    #[test]
    fn metabolite_container_dedups_by_original_id() {
        let mut container = MetaboliteContainer::new();
        container.add_hit(MwasHit {
            record: HitRecord::new("HMDB:1", Some("first".into())),
        });
        container.add_hit(MwasHit {
            record: HitRecord::new("HMDB:1", Some("second".into())),
        });

        assert_eq!(container.hit_count(), 1);
        assert_eq!(
            container.iterate().next().unwrap().record.original_name,
            Some("second".into())
        );
    }
}
