//! Where the data lives and how much of the event log to hold in memory at once.
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

/// Number of event rows held in memory at once unless told otherwise.
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(1_000_000) {
    Some(size) => size,
    None => panic!("chunk size must be positive"),
};

/// File names of every input and output, relative to the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataFiles {
    pub admissions: PathBuf,
    /// Hospital admissions meeting the sepsis definition.
    pub cohort: PathBuf,
    pub cohort_keys: PathBuf,
    /// The item dictionary.
    pub dictionary: PathBuf,
    /// The labels of the measurements to keep.
    pub selection: PathBuf,
    pub allow_list: PathBuf,
    pub events: PathBuf,
    pub output: PathBuf,
}

impl Default for DataFiles {
    fn default() -> Self {
        DataFiles {
            admissions: "ADMISSIONS.csv".into(),
            cohort: "sepsis3-df.csv".into(),
            cohort_keys: "sepsis3-patients.csv".into(),
            dictionary: "D_ITEMS.csv".into(),
            selection: "D_ITEMS_select.csv".into(),
            allow_list: "D_ITEMS_final.csv".into(),
            events: "CHARTEVENTS.csv".into(),
            output: "sepsis_chartevents.csv".into(),
        }
    }
}

impl DataFiles {
    /// Load file names from a TOML file. Names not given keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        fn inner(path: &Path) -> Result<DataFiles> {
            let src = fs::read_to_string(path)?;
            Ok(toml::from_str(&src)?)
        }
        let path = path.as_ref();
        inner(path)
            .with_context(|| format!("unable to load file names from \"{}\"", path.display()))
    }
}

/// Everything a run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub chunk_size: NonZeroUsize,
    pub files: DataFiles,
}

impl Config {
    /// The default file names inside `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Config {
            data_dir: data_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            files: DataFiles::default(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_files(mut self, files: DataFiles) -> Self {
        self.files = files;
        self
    }

    fn path(&self, name: &Path) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn admissions_path(&self) -> PathBuf {
        self.path(&self.files.admissions)
    }

    pub fn cohort_path(&self) -> PathBuf {
        self.path(&self.files.cohort)
    }

    pub fn cohort_keys_path(&self) -> PathBuf {
        self.path(&self.files.cohort_keys)
    }

    pub fn dictionary_path(&self) -> PathBuf {
        self.path(&self.files.dictionary)
    }

    pub fn selection_path(&self) -> PathBuf {
        self.path(&self.files.selection)
    }

    pub fn allow_list_path(&self) -> PathBuf {
        self.path(&self.files.allow_list)
    }

    pub fn events_path(&self) -> PathBuf {
        self.path(&self.files.events)
    }

    pub fn output_path(&self) -> PathBuf {
        self.path(&self.files.output)
    }
}

/// Command line options shared by all the binaries.
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Directory holding the input files. Outputs are written here too.
    #[clap(long, default_value = "./data")]
    pub datadir: PathBuf,
    /// Number of event rows to process at a time.
    #[clap(long, default_value = "1000000")]
    pub chunksize: NonZeroUsize,
    /// A TOML file overriding the names of the input and output files.
    #[clap(long)]
    pub files: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn into_config(self) -> Result<Config> {
        let files = match &self.files {
            Some(path) => DataFiles::load(path)?,
            None => DataFiles::default(),
        };
        Ok(Config::new(self.datadir)
            .with_chunk_size(self.chunksize)
            .with_files(files))
    }
}
