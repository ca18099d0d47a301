use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use indexmap::{map::Entry, IndexMap};
use tracing::debug;

use super::{DumpError, Storage};
use crate::{
    normalize::{Header, Rows},
    output::write_records,
};

/// Appends the rows of each `<master>_<query>` pair to its own CSV file inside a
/// `RUN_<started>` folder.
pub struct LocalStorage {
    folder: PathBuf,
    files: IndexMap<String, OutputFile>,
}

struct OutputFile {
    writer: csv::Writer<File>,
    /// header written when the file was created; later rows are laid out by it
    columns: Vec<String>,
}

impl LocalStorage {
    pub fn new(output_folder: &Path, started: NaiveDateTime) -> Self {
        LocalStorage {
            folder: output_folder.join(started.format("RUN_%Y-%m-%d_%H-%M").to_string()),
            files: IndexMap::new(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn file(&mut self, name: &str, header: &Header) -> Result<&mut OutputFile, DumpError> {
        match self.files.entry(name.to_owned()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                fs::create_dir_all(&self.folder)?;
                let mut writer = csv::Writer::from_path(self.folder.join(format!("{name}.csv")))?;
                writer.write_record(header.columns())?;
                Ok(entry.insert(OutputFile {
                    writer,
                    columns: header.columns().to_vec(),
                }))
            }
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn dump(
        &mut self,
        master_name: &str,
        query_name: &str,
        header: &Header,
        rows: Rows<'_>,
    ) -> Result<usize, DumpError> {
        let mut rows = rows.peekable();
        if rows.peek().is_none() {
            return Ok(0);
        }

        let name = format!("{master_name}_{query_name}");
        let file = self.file(&name, header)?;
        let count = write_records(&mut file.writer, &file.columns, rows)?;
        file.writer.flush()?;

        debug!(count, file = %name, "appended rows");
        Ok(count)
    }
}
