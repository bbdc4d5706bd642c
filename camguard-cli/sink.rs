//! Per-category path logs and the run manifest.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GuardResult, IoContext};

pub const MANIFEST_NAME: &str = "SumLog.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Missing or unreadable sample, size mismatch, detector failure
    Error,
    BlackScreen,
    SnowScreen,
    OtherScreen,
    Shift,
    /// Nothing to compare: one of the images had no features
    Undetermined,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Error,
        Category::BlackScreen,
        Category::SnowScreen,
        Category::OtherScreen,
        Category::Shift,
        Category::Undetermined,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Category::Error => "Error.log",
            Category::BlackScreen => "BlackScreen.log",
            Category::SnowScreen => "SnowScreen.log",
            Category::OtherScreen => "OtherScreen.log",
            Category::Shift => "Shift.log",
            Category::Undetermined => "Undetermined.log",
        }
    }

    /// `type` field of the manifest entry
    pub fn kind(self) -> &'static str {
        match self {
            Category::Error => "error",
            Category::BlackScreen => "BlackScreen",
            Category::SnowScreen => "SnowScreen",
            Category::OtherScreen => "otherScreen",
            Category::Shift => "Shift",
            Category::Undetermined => "Undetermined",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::Error => "sample missing, unreadable or not the size of the baseline",
            Category::BlackScreen => "black screen",
            Category::SnowScreen => "snow screen",
            Category::OtherScreen => "other screen fault",
            Category::Shift => "camera shift",
            Category::Undetermined => "no features to compare",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub path: PathBuf,
    pub count: usize,
}

/// Owns the six category logs; only one writer may hold it.
pub struct CategorySinks {
    dir: PathBuf,
    writers: Vec<BufWriter<File>>,
    counts: [usize; 6],
}

impl CategorySinks {
    /// Creates (truncating) every category log in `dir`
    pub fn create<P: AsRef<Path>>(dir: P) -> GuardResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).with_path(&dir)?;
        let writers = Category::ALL
            .iter()
            .map(|c| {
                let path = dir.join(c.file_name());
                File::create(&path).with_path(path).map(BufWriter::new)
            })
            .collect::<GuardResult<Vec<_>>>()?;
        Ok(Self {
            dir,
            writers,
            counts: [0; 6],
        })
    }

    pub fn record(&mut self, category: Category, path: &Path) -> GuardResult<()> {
        let slot = category.slot();
        writeln!(self.writers[slot], "{}", path.display())
            .with_path(self.dir.join(category.file_name()))?;
        self.counts[slot] += 1;
        Ok(())
    }

    pub fn count(&self, category: Category) -> usize {
        self.counts[category.slot()]
    }

    /// Flushes every log and writes the manifest
    pub fn finish(mut self) -> GuardResult<Vec<SummaryEntry>> {
        for (c, w) in Category::ALL.iter().zip(self.writers.iter_mut()) {
            w.flush().with_path(self.dir.join(c.file_name()))?;
        }

        let entries: Vec<SummaryEntry> = Category::ALL
            .iter()
            .map(|&c| SummaryEntry {
                kind: c.kind().to_string(),
                name: c.description().to_string(),
                path: self.dir.join(c.file_name()),
                count: self.counts[c.slot()],
            })
            .collect();

        let manifest = self.dir.join(MANIFEST_NAME);
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            .with_path(&manifest)?;
        std::fs::write(&manifest, json).with_path(&manifest)?;
        info!(path = %manifest.display(), "wrote manifest");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_lines_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut sinks = CategorySinks::create(dir.path()).unwrap();
        sinks.record(Category::Shift, Path::new("/data/a_1.jpg")).unwrap();
        sinks.record(Category::Shift, Path::new("/data/a_2.jpg")).unwrap();
        sinks.record(Category::BlackScreen, Path::new("/data/b.jpg")).unwrap();
        assert_eq!(sinks.count(Category::Shift), 2);
        let entries = sinks.finish().unwrap();

        let shift = std::fs::read_to_string(dir.path().join("Shift.log")).unwrap();
        assert_eq!(shift, "/data/a_1.jpg\n/data/a_2.jpg\n");
        let error = std::fs::read_to_string(dir.path().join("Error.log")).unwrap();
        assert!(error.is_empty());

        assert_eq!(entries.len(), 6);
        let black = entries.iter().find(|e| e.kind == "BlackScreen").unwrap();
        assert_eq!(black.count, 1);
    }

    #[test]
    fn manifest_uses_type_key() {
        let dir = tempfile::tempdir().unwrap();
        CategorySinks::create(dir.path()).unwrap().finish().unwrap();
        let text = std::fs::read_to_string(dir.path().join(MANIFEST_NAME)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr.len(), 6);
        assert_eq!(arr[0]["type"], "error");
        assert_eq!(arr[3]["type"], "otherScreen");
        assert_eq!(arr[4]["count"], 0);
        assert!(arr[4]["path"].as_str().unwrap().ends_with("Shift.log"));
    }
}
