use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{LoadError, SaveError};
use crate::model::Kml;
use crate::parser::parse_kml;
use crate::writer::KmlWriter;

/// KMZ内のKMLエントリ名（Google Earthの慣例）
pub const KML_ENTRY_NAME: &str = "doc.kml";

/// KMZ（KML文書をひとつ含むzip）の読み書き
pub struct ZipHandler {
    path: PathBuf,
}

impl ZipHandler {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_kml(&self) -> Result<Kml, LoadError> {
        let file = File::open(&self.path).map_err(|source| LoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let entry_name = find_kml_entry(&archive).ok_or_else(|| LoadError::MissingKmlEntry {
            path: self.path.clone(),
        })?;
        debug!("Reading KML entry '{}' from {:?}", entry_name, self.path);

        // ヘッダの展開後サイズは信用せず、読んだ分だけ確保する
        let mut entry = archive.by_name(&entry_name)?;
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|source| LoadError::Entry {
                entry: entry_name.clone(),
                source,
            })?;

        let kml = parse_kml(bytes.as_slice())?;
        info!(
            "Loaded {:?} ({} placemarks)",
            self.path,
            kml.document.placemarks().count()
        );
        Ok(kml)
    }

    /// 一時ファイルに書いてから置き換えるので、既存のファイルは
    /// 書き終えたアーカイブでしか上書きされない
    pub fn write_kml(&self, kml: &Kml) -> Result<(), SaveError> {
        let bytes = KmlWriter::new().to_bytes(kml)?;

        let tmp_path = temp_path(&self.path);
        if let Err(e) = write_archive(&tmp_path, &bytes) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        if let Err(source) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(SaveError::Io {
                path: self.path.clone(),
                source,
            });
        }

        info!("Saved {:?} ({} bytes of KML)", self.path, bytes.len());
        Ok(())
    }
}

/// `doc.kml` を優先し、なければ最初の `.kml` エントリ
fn find_kml_entry<R: Read + Seek>(archive: &ZipArchive<R>) -> Option<String> {
    let names: Vec<&str> = archive.file_names().collect();

    names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(KML_ENTRY_NAME))
        .or_else(|| {
            names
                .iter()
                .find(|name| name.to_ascii_lowercase().ends_with(".kml"))
        })
        .map(|name| name.to_string())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn write_archive(path: &Path, kml_bytes: &[u8]) -> Result<(), SaveError> {
    let io_error = |source| SaveError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_error)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(KML_ENTRY_NAME, options)?;
    zip.write_all(kml_bytes).map_err(io_error)?;
    let file = zip.finish()?;
    file.sync_all().map_err(io_error)?;

    Ok(())
}
