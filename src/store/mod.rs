//! Relational project-state store (spec §6): projects, studies, hits and
//! errors, persisted independently of the graph database so the pipeline's
//! own bookkeeping survives a graph-store outage.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crate::err::ErrorType;
use crate::model::{ErrorRecord, GwasHit, HitRecord, MwasHit, Project, Study, StudyKind};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS r_projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS r_studies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES r_projects(id),
    file_path TEXT NOT NULL,
    study_name TEXT NOT NULL,
    study_type TEXT NOT NULL,
    original_trait_id TEXT NOT NULL,
    original_trait_type TEXT NOT NULL,
    original_trait_label TEXT NOT NULL,
    p_value_cutoff REAL NOT NULL,
    max_p_value REAL,
    has_tabix INTEGER NOT NULL DEFAULT 0,
    searched INTEGER NOT NULL DEFAULT 0,
    written INTEGER NOT NULL DEFAULT 0,
    num_hits INTEGER,
    num_associations INTEGER,
    trait_normalized INTEGER NOT NULL DEFAULT 0,
    normalized_trait_id TEXT,
    normalized_trait_label TEXT
);

CREATE TABLE IF NOT EXISTS r_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    study_id INTEGER NOT NULL REFERENCES r_studies(id),
    error_type INTEGER NOT NULL,
    error_message TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS gwas_hits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES r_projects(id),
    study_id INTEGER NOT NULL REFERENCES r_studies(id),
    original_id TEXT NOT NULL,
    original_name TEXT,
    normalized INTEGER NOT NULL DEFAULT 0,
    normalized_id TEXT,
    normalized_name TEXT,
    written INTEGER NOT NULL DEFAULT 0,
    hgvs TEXT NOT NULL,
    chrom TEXT NOT NULL,
    pos INTEGER NOT NULL,
    ref_allele TEXT NOT NULL,
    alt_allele TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mwas_hits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES r_projects(id),
    study_id INTEGER NOT NULL REFERENCES r_studies(id),
    original_id TEXT NOT NULL,
    original_name TEXT,
    normalized INTEGER NOT NULL DEFAULT 0,
    normalized_id TEXT,
    normalized_name TEXT,
    written INTEGER NOT NULL DEFAULT 0
);
"#;

/// Which slice of a study's hits a caller wants, per spec §4.G's
/// incremental/full rebuild distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitSelector {
    All,
    Unprocessed,
    Unwritten,
}

pub struct ProjectStore {
    pool: SqlitePool,
}

impl ProjectStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(database_url).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn create_project(&self, name: &str) -> Result<Project, sqlx::Error> {
        let id = sqlx::query("INSERT INTO r_projects (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(Project { id, name: name.to_string() })
    }

    pub async fn get_projects(&self) -> Result<Vec<Project>, sqlx::Error> {
        let rows = sqlx::query("SELECT id, name FROM r_projects").fetch_all(&self.pool).await?;
        Ok(rows.iter().map(project_from_row).collect())
    }

    pub async fn get_project_by_id(&self, project_id: i64) -> Result<Option<Project>, sqlx::Error> {
        let row = sqlx::query("SELECT id, name FROM r_projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(project_from_row))
    }

    pub async fn get_project_by_name(&self, name: &str) -> Result<Option<Project>, sqlx::Error> {
        let row = sqlx::query("SELECT id, name FROM r_projects WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(project_from_row))
    }

    /// Cascades through every study, hit and error row before removing the
    /// project itself, all inside one transaction.
    pub async fn delete_project(&self, project_id: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let study_ids: Vec<i64> = sqlx::query("SELECT id FROM r_studies WHERE project_id = ?")
            .bind(project_id)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| row.get::<i64, _>("id"))
            .collect();

        for study_id in study_ids {
            sqlx::query("DELETE FROM gwas_hits WHERE study_id = ?").bind(study_id).execute(&mut *tx).await?;
            sqlx::query("DELETE FROM mwas_hits WHERE study_id = ?").bind(study_id).execute(&mut *tx).await?;
            sqlx::query("DELETE FROM r_errors WHERE study_id = ?").bind(study_id).execute(&mut *tx).await?;
            sqlx::query("DELETE FROM r_studies WHERE id = ?").bind(study_id).execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM r_projects WHERE id = ?").bind(project_id).execute(&mut *tx).await?;

        tx.commit().await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_study(
        &self,
        project_id: i64,
        file_path: &str,
        study_name: &str,
        study_type: StudyKind,
        original_trait_id: &str,
        original_trait_type: &str,
        original_trait_label: &str,
        p_value_cutoff: f64,
        max_p_value: Option<f64>,
        has_tabix: bool,
    ) -> Result<Study, sqlx::Error> {
        let id = sqlx::query(
            "INSERT INTO r_studies (project_id, file_path, study_name, study_type, original_trait_id, \
             original_trait_type, original_trait_label, p_value_cutoff, max_p_value, has_tabix) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(file_path)
        .bind(study_name)
        .bind(study_type.to_string())
        .bind(original_trait_id)
        .bind(original_trait_type)
        .bind(original_trait_label)
        .bind(p_value_cutoff)
        .bind(max_p_value)
        .bind(has_tabix)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Study {
            id,
            project_id,
            study_name: study_name.to_string(),
            study_type,
            file_path: file_path.to_string(),
            p_value_cutoff,
            max_p_value,
            has_tabix,
            original_trait_id: original_trait_id.to_string(),
            original_trait_type: original_trait_type.to_string(),
            original_trait_label: original_trait_label.to_string(),
            normalized_trait_id: None,
            normalized_trait_label: None,
            trait_normalized: false,
            searched: false,
            written: false,
            num_hits: None,
            num_associations: None,
        })
    }

    pub async fn get_all_studies(&self, project_id: i64) -> Result<Vec<Study>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM r_studies WHERE project_id = ?")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(study_from_row).collect()
    }

    pub async fn get_study_by_id(&self, study_id: i64) -> Result<Option<Study>, sqlx::Error> {
        let row =
            sqlx::query("SELECT * FROM r_studies WHERE id = ?").bind(study_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(study_from_row).transpose()
    }

    pub async fn save_study(&self, study: &Study) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE r_studies SET searched = ?, written = ?, num_hits = ?, num_associations = ?, \
             trait_normalized = ?, normalized_trait_id = ?, normalized_trait_label = ? WHERE id = ?",
        )
        .bind(study.searched)
        .bind(study.written)
        .bind(study.num_hits)
        .bind(study.num_associations)
        .bind(study.trait_normalized)
        .bind(&study.normalized_trait_id)
        .bind(&study.normalized_trait_label)
        .bind(study.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_study_errors(&self, study_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM r_errors WHERE study_id = ?").bind(study_id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn clear_study_errors_by_type(
        &self,
        study_id: i64,
        error_type: ErrorType,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM r_errors WHERE study_id = ? AND error_type = ?")
            .bind(study_id)
            .bind(error_type.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_study_error(
        &self,
        study_id: i64,
        error_type: ErrorType,
        error_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO r_errors (study_id, error_type, error_message) VALUES (?, ?, ?)")
            .bind(study_id)
            .bind(error_type.as_i64())
            .bind(error_message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_study_errors(&self, study_id: i64) -> Result<Vec<ErrorRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM r_errors WHERE study_id = ?")
            .bind(study_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let error_type = ErrorType::from_i64(row.get::<i64, _>("error_type"))?;
                Some(ErrorRecord {
                    id: row.get("id"),
                    study_id: row.get("study_id"),
                    error_type,
                    error_message: row.get("error_message"),
                })
            })
            .collect())
    }

    pub async fn get_gwas_hits_for_study(
        &self,
        study_id: i64,
        selector: HitSelector,
    ) -> Result<Vec<GwasHit>, sqlx::Error> {
        let rows = match selector {
            HitSelector::All => {
                sqlx::query("SELECT * FROM gwas_hits WHERE study_id = ?")
                    .bind(study_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            HitSelector::Unprocessed => {
                sqlx::query("SELECT * FROM gwas_hits WHERE study_id = ? AND normalized = 0")
                    .bind(study_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            HitSelector::Unwritten => {
                sqlx::query("SELECT * FROM gwas_hits WHERE study_id = ? AND written = 0")
                    .bind(study_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.iter().map(gwas_hit_from_row).collect())
    }

    pub async fn get_mwas_hits_for_study(
        &self,
        study_id: i64,
        selector: HitSelector,
    ) -> Result<Vec<MwasHit>, sqlx::Error> {
        let rows = match selector {
            HitSelector::All => {
                sqlx::query("SELECT * FROM mwas_hits WHERE study_id = ?")
                    .bind(study_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            HitSelector::Unprocessed => {
                sqlx::query("SELECT * FROM mwas_hits WHERE study_id = ? AND normalized = 0")
                    .bind(study_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            HitSelector::Unwritten => {
                sqlx::query("SELECT * FROM mwas_hits WHERE study_id = ? AND written = 0")
                    .bind(study_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.iter().map(mwas_hit_from_row).collect())
    }

    pub async fn get_gwas_hits(&self, project_id: i64, selector: HitSelector) -> Result<Vec<GwasHit>, sqlx::Error> {
        let rows = match selector {
            HitSelector::All => {
                sqlx::query("SELECT * FROM gwas_hits WHERE project_id = ?")
                    .bind(project_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            HitSelector::Unprocessed => {
                sqlx::query("SELECT * FROM gwas_hits WHERE project_id = ? AND normalized = 0")
                    .bind(project_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            HitSelector::Unwritten => {
                sqlx::query("SELECT * FROM gwas_hits WHERE project_id = ? AND written = 0")
                    .bind(project_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.iter().map(gwas_hit_from_row).collect())
    }

    pub async fn get_mwas_hits(&self, project_id: i64, selector: HitSelector) -> Result<Vec<MwasHit>, sqlx::Error> {
        let rows = match selector {
            HitSelector::All => {
                sqlx::query("SELECT * FROM mwas_hits WHERE project_id = ?")
                    .bind(project_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            HitSelector::Unprocessed => {
                sqlx::query("SELECT * FROM mwas_hits WHERE project_id = ? AND normalized = 0")
                    .bind(project_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            HitSelector::Unwritten => {
                sqlx::query("SELECT * FROM mwas_hits WHERE project_id = ? AND written = 0")
                    .bind(project_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.iter().map(mwas_hit_from_row).collect())
    }

    pub async fn create_gwas_hit(&self, project_id: i64, study_id: i64, hit: &GwasHit) -> Result<i64, sqlx::Error> {
        let id = sqlx::query(
            "INSERT INTO gwas_hits (project_id, study_id, original_id, original_name, normalized, hgvs, chrom, \
             pos, ref_allele, alt_allele) VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(study_id)
        .bind(&hit.record.original_id)
        .bind(&hit.record.original_name)
        .bind(&hit.hgvs)
        .bind(&hit.chrom)
        .bind(hit.pos)
        .bind(&hit.reference)
        .bind(&hit.alt)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn create_mwas_hit(&self, project_id: i64, study_id: i64, hit: &MwasHit) -> Result<i64, sqlx::Error> {
        let id = sqlx::query(
            "INSERT INTO mwas_hits (project_id, study_id, original_id, original_name, normalized) \
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(project_id)
        .bind(study_id)
        .bind(&hit.record.original_id)
        .bind(&hit.record.original_name)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Batched insert (spec §4.G): every hit in `hits` is written inside a
    /// single transaction and committed once, rather than the N independent
    /// commits `create_gwas_hit` performs on its own.
    pub async fn save_gwas_hits(
        &self,
        project_id: i64,
        study_id: i64,
        hits: &[GwasHit],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for hit in hits {
            sqlx::query(
                "INSERT INTO gwas_hits (project_id, study_id, original_id, original_name, normalized, hgvs, chrom, \
                 pos, ref_allele, alt_allele) VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
            )
            .bind(project_id)
            .bind(study_id)
            .bind(&hit.record.original_id)
            .bind(&hit.record.original_name)
            .bind(&hit.hgvs)
            .bind(&hit.chrom)
            .bind(hit.pos)
            .bind(&hit.reference)
            .bind(&hit.alt)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    /// MWAS equivalent of [`Self::save_gwas_hits`].
    pub async fn save_mwas_hits(
        &self,
        project_id: i64,
        study_id: i64,
        hits: &[MwasHit],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for hit in hits {
            sqlx::query(
                "INSERT INTO mwas_hits (project_id, study_id, original_id, original_name, normalized) \
                 VALUES (?, ?, ?, ?, 0)",
            )
            .bind(project_id)
            .bind(study_id)
            .bind(&hit.record.original_id)
            .bind(&hit.record.original_name)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    pub async fn save_gwas_hit(&self, hit: &GwasHit) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE gwas_hits SET normalized = ?, normalized_id = ?, normalized_name = ?, written = ? WHERE id = ?",
        )
        .bind(hit.record.normalized)
        .bind(&hit.record.normalized_id)
        .bind(&hit.record.normalized_name)
        .bind(hit.record.written)
        .bind(hit.record.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_mwas_hit(&self, hit: &MwasHit) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE mwas_hits SET normalized = ?, normalized_id = ?, normalized_name = ?, written = ? WHERE id = ?",
        )
        .bind(hit.record.normalized)
        .bind(&hit.record.normalized_id)
        .bind(&hit.record.normalized_name)
        .bind(hit.record.written)
        .bind(hit.record.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> Project {
    Project { id: row.get("id"), name: row.get("name") }
}

fn study_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Study, sqlx::Error> {
    let study_type_str: String = row.get("study_type");
    let study_type = study_type_str.parse::<StudyKind>().map_err(|e| sqlx::Error::ColumnDecode {
        index: "study_type".to_string(),
        source: Box::new(e),
    })?;

    Ok(Study {
        id: row.get("id"),
        project_id: row.get("project_id"),
        study_name: row.get("study_name"),
        study_type,
        file_path: row.get("file_path"),
        p_value_cutoff: row.get("p_value_cutoff"),
        max_p_value: row.get("max_p_value"),
        has_tabix: row.get("has_tabix"),
        original_trait_id: row.get("original_trait_id"),
        original_trait_type: row.get("original_trait_type"),
        original_trait_label: row.get("original_trait_label"),
        normalized_trait_id: row.get("normalized_trait_id"),
        normalized_trait_label: row.get("normalized_trait_label"),
        trait_normalized: row.get("trait_normalized"),
        searched: row.get("searched"),
        written: row.get("written"),
        num_hits: row.get("num_hits"),
        num_associations: row.get("num_associations"),
    })
}

fn hit_record_from_row(row: &sqlx::sqlite::SqliteRow) -> HitRecord {
    HitRecord {
        id: row.get("id"),
        project_id: row.get("project_id"),
        study_id: row.get("study_id"),
        original_id: row.get("original_id"),
        original_name: row.get("original_name"),
        normalized: row.get("normalized"),
        normalized_id: row.get("normalized_id"),
        normalized_name: row.get("normalized_name"),
        written: row.get("written"),
    }
}

fn gwas_hit_from_row(row: &sqlx::sqlite::SqliteRow) -> GwasHit {
    GwasHit {
        record: hit_record_from_row(row),
        hgvs: row.get("hgvs"),
        chrom: row.get("chrom"),
        pos: row.get("pos"),
        reference: row.get("ref_allele"),
        alt: row.get("alt_allele"),
    }
}

fn mwas_hit_from_row(row: &sqlx::sqlite::SqliteRow) -> MwasHit {
    MwasHit { record: hit_record_from_row(row) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn delete_project_cascades() {
        let store = ProjectStore::connect("sqlite::memory:").await.unwrap();
        let project = store.create_project("demo").await.unwrap();
        let study = store
            .create_study(
                project.id,
                "study.tsv",
                "demo-study",
                StudyKind::Gwas,
                "MONDO:1",
                "biolink:Disease",
                "demo trait",
                0.05,
                None,
                false,
            )
            .await
            .unwrap();
        let hit = GwasHit {
            record: HitRecord::new("NC_000001.10:g.100A>T", None),
            hgvs: "NC_000001.10:g.100A>T".to_string(),
            chrom: "1".to_string(),
            pos: 100,
            reference: "A".to_string(),
            alt: "T".to_string(),
        };
        store.create_gwas_hit(project.id, study.id, &hit).await.unwrap();
        store.create_study_error(study.id, ErrorType::Searching, "boom").await.unwrap();

        store.delete_project(project.id).await.unwrap();

        assert!(store.get_project_by_id(project.id).await.unwrap().is_none());
        assert!(store.get_gwas_hits(project.id, HitSelector::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unprocessed_hits_exclude_normalized() {
        let store = ProjectStore::connect("sqlite::memory:").await.unwrap();
        let project = store.create_project("demo").await.unwrap();
        let study = store
            .create_study(
                project.id,
                "study.csv",
                "demo-study",
                StudyKind::Mwas,
                "MONDO:1",
                "biolink:Disease",
                "demo trait",
                0.05,
                None,
                false,
            )
            .await
            .unwrap();
        let hit = MwasHit { record: HitRecord::new("HMDB:1", Some("glucose".into())) };
        let hit_id = store.create_mwas_hit(project.id, study.id, &hit).await.unwrap();

        let mut fetched = store.get_mwas_hits(project.id, HitSelector::Unprocessed).await.unwrap();
        assert_eq!(fetched.len(), 1);
        fetched[0].record.id = hit_id;
        fetched[0].record.normalized = true;
        store.save_mwas_hit(&fetched[0]).await.unwrap();

        let remaining = store.get_mwas_hits(project.id, HitSelector::Unprocessed).await.unwrap();
        assert!(remaining.is_empty());
    }
}
