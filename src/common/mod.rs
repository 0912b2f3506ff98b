//! Common functionality shared across the build pipeline.

use clap_verbosity_flag::Verbosity;

use clap::Parser;

pub mod io;

/// Commonly used command line arguments.
#[derive(Parser, Debug, Clone)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Genome assembly a study's coordinates are reported against.
///
/// Spans the same concept as the teacher's `db::conf::GenomeRelease`, kept
/// under the vocabulary (`HG19`/`HG38`) this system's source files use.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    Default,
    strum_macros::EnumString,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum GenomeRelease {
    #[default]
    Hg19,
    Hg38,
}

impl From<GenomeRelease> for biocommons_bioutils::assemblies::Assembly {
    fn from(val: GenomeRelease) -> Self {
        match val {
            GenomeRelease::Hg19 => biocommons_bioutils::assemblies::Assembly::Grch37p10,
            GenomeRelease::Hg38 => biocommons_bioutils::assemblies::Assembly::Grch38,
        }
    }
}
