//! MWAS (CSV) file reader.

use crate::hits::{HitsContainer, MetaboliteContainer};
use crate::model::{Association, HitRecord, MwasHit};

use super::{ScanOutcome, StudyReader};

#[derive(Debug, Clone)]
pub struct MwasFile {
    pub file_path: String,
}

impl MwasFile {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self { file_path: file_path.into() }
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndices {
    curie: usize,
    label: usize,
    p_value: usize,
    beta: usize,
}

fn find_columns(headers: &csv::StringRecord) -> Option<ColumnIndices> {
    let mut curie = None;
    let mut label = None;
    let mut p_value = None;
    let mut beta = None;

    for (i, header) in headers.iter().enumerate() {
        let lower = header.to_lowercase();
        if header == "curie" {
            curie = Some(i);
        } else if header == "label" {
            label = Some(i);
        } else if lower.contains("pval") || lower.contains("pvalue") {
            p_value = Some(i);
        } else if lower.contains("beta") {
            beta = Some(i);
        }
    }

    Some(ColumnIndices {
        curie: curie?,
        label: label?,
        p_value: p_value?,
        beta: beta.unwrap_or(0),
    })
}

pub struct MwasReader {
    file: MwasFile,
}

impl MwasReader {
    pub fn new(file: MwasFile) -> Self {
        Self { file }
    }

    fn open(&self) -> Result<csv::Reader<std::fs::File>, anyhow::Error> {
        Ok(csv::ReaderBuilder::new().has_headers(true).from_path(&self.file.file_path)?)
    }
}

impl StudyReader for MwasReader {
    type Hit = MwasHit;
    type Container = MetaboliteContainer;

    fn find_significant_hits(&self, p_value_cutoff: f64) -> ScanOutcome<MetaboliteContainer> {
        let mut reader = match self.open() {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!("Could not open file: {}: {}", self.file.file_path, e);
                return ScanOutcome::failed(e.to_string());
            }
        };

        let headers = reader.headers().cloned().unwrap_or_default();
        let Some(columns) = find_columns(&headers) else {
            tracing::warn!("Error reading file headers for {} - {:?}", self.file.file_path, headers);
            return ScanOutcome::failed(format!("bad file headers in {}", self.file.file_path));
        };

        let mut container = MetaboliteContainer::new();
        let mut num_found = 0i64;
        let mut line_counter = 0i64;

        for result in reader.records() {
            line_counter += 1;
            let Ok(record) = result else {
                tracing::warn!("Error parsing file {}, on line {}", self.file.file_path, line_counter);
                continue;
            };

            let Some(p_value_string) = record.get(columns.p_value) else {
                tracing::warn!("Error parsing file {}, on line {}", self.file.file_path, line_counter);
                continue;
            };
            let Ok(p_value) = p_value_string.parse::<f64>() else {
                tracing::warn!("Error converting {} to float in {}", p_value_string, self.file.file_path);
                continue;
            };

            if p_value <= p_value_cutoff {
                let Some(curie) = record.get(columns.curie) else { continue };
                let label = record.get(columns.label).map(|s| s.to_string());
                container.add_hit(MwasHit { record: HitRecord::new(curie, label) });
                num_found += 1;
            }
        }

        tracing::info!("Found {} significant metabolites in {}!", num_found, self.file.file_path);
        ScanOutcome::ok(container, num_found)
    }

    fn get_association(&self, hit: &MwasHit) -> Option<Association> {
        let mut reader = self.open().ok()?;
        let headers = reader.headers().cloned().ok()?;
        let columns = find_columns(&headers)?;

        for result in reader.records() {
            let record = result.ok()?;
            if record.get(columns.curie) == Some(hit.record.original_id.as_str()) {
                let mut p_value: f64 = record.get(columns.p_value)?.parse().ok()?;
                if p_value == 0.0 {
                    p_value = f64::MIN_POSITIVE;
                }
                let beta: f64 = record.get(columns.beta)?.parse().ok()?;
                return Some(Association { p_value, beta });
            }
        }
        None
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
    fn finds_significant_hits() {
        let tmp_dir = temp_testdir::TempDir::default();
        let contents = "curie,label,pvalue,beta\n\
                         HMDB:1,glucose,1e-10,0.5\n\
                         HMDB:2,lactate,0.9,0.1\n";
        let path = write_fixture(&tmp_dir, "study.csv", contents);

        let reader = MwasReader::new(MwasFile::new(path));
        let outcome = reader.find_significant_hits(1e-5);

        assert!(outcome.success);
        assert_eq!(outcome.hit_count, 1);
    }

    #[test]
    fn get_association_clamps_zero_p_value() {
        let tmp_dir = temp_testdir::TempDir::default();
        let contents = "curie,label,pvalue,beta\nHMDB:1,glucose,0,0.5\n";
        let path = write_fixture(&tmp_dir, "study.csv", contents);

        let reader = MwasReader::new(MwasFile::new(path));
        let hit = MwasHit { record: HitRecord::new("HMDB:1", Some("glucose".into())) };

        let association = reader.get_association(&hit).unwrap();
        assert_eq!(association.p_value, f64::MIN_POSITIVE);
        assert_eq!(association.beta, 0.5);
    }

    #[test]
    fn reports_bad_headers() {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = write_fixture(&tmp_dir, "study.csv", "a,b,c\n1,2,3\n");

        let reader = MwasReader::new(MwasFile::new(path));
        let outcome = reader.find_significant_hits(1e-5);

        assert!(!outcome.success);
    }
}
