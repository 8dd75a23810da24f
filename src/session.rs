use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::document::KmzDocument;
use crate::error::{SessionError, Warning};
use crate::extract::ExtractorRegistry;
use crate::model::{DistanceRecord, PointRecord};
use crate::transform::transform;

const KMZ_EXTENSION: &str = ".kmz";

/// セッションの既定値と距離計算で使える測地系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Datum {
    #[default]
    Wgs84,
    /// 北米の標準
    Nad83,
    /// スペイン（欧州）の標準
    Etrs89,
}

impl Datum {
    pub const ALL: [Datum; 3] = [Datum::Wgs84, Datum::Nad83, Datum::Etrs89];

    pub fn as_str(&self) -> &'static str {
        match self {
            Datum::Wgs84 => "WGS84",
            Datum::Nad83 => "NAD83",
            Datum::Etrs89 => "ETRS89",
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datum {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Datum::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| SessionError::UnsupportedDatum(s.to_string()))
    }
}

/// バッチファイルの点を追加した結果
#[derive(Debug, Default)]
pub struct BatchReport {
    pub added: Vec<PointRecord>,
    /// 同名があって追加しなかった点
    pub duplicates: Vec<String>,
    /// 座標変換に失敗した点
    pub failed: Vec<(String, SessionError)>,
    /// 読み飛ばした行
    pub warnings: Vec<Warning>,
}

/// 編集中の文書、未保存フラグ、既定の測地系
pub struct Session {
    document: Option<KmzDocument>,
    dirty: bool,
    datum: Datum,
    extractors: ExtractorRegistry,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_extractors(ExtractorRegistry::with_defaults())
    }

    pub fn with_extractors(extractors: ExtractorRegistry) -> Self {
        Self {
            document: None,
            dirty: false,
            datum: Datum::default(),
            extractors,
        }
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn document(&self) -> Option<&KmzDocument> {
        self.document.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn datum(&self) -> Datum {
        self.datum
    }

    pub fn set_datum(&mut self, datum: &str) -> Result<Datum, SessionError> {
        self.datum = datum.parse()?;
        info!("Default datum set to {}", self.datum);
        Ok(self.datum)
    }

    pub fn reset_datum(&mut self) {
        self.datum = Datum::default();
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        self.extractors.supported_extensions()
    }

    /// 新規ドキュメント。未保存扱いになる
    pub fn new_document(&mut self) {
        self.document = Some(KmzDocument::new());
        self.dirty = true;
    }

    /// KMZを開く。失敗したら今の文書のまま
    pub fn open(&mut self, path: &Path) -> Result<Vec<Warning>, SessionError> {
        let path = with_kmz_extension(path);
        let loaded = KmzDocument::load(&path)?;

        self.document = Some(loaded.document);
        self.dirty = false;
        Ok(loaded.warnings)
    }

    /// 保存する。未保存フラグは成功したときだけ下ろす
    pub fn save(&mut self, path: Option<&Path>) -> Result<PathBuf, SessionError> {
        let document = self.document.as_mut().ok_or(SessionError::NoDocument)?;
        let path = path.map(with_kmz_extension);

        let written = document.save(path.as_deref())?;
        self.dirty = false;
        Ok(written)
    }

    pub fn points(&self) -> Result<Vec<PointRecord>, SessionError> {
        Ok(self.document_ref()?.list_points())
    }

    pub fn add_lon_lat(&mut self, name: &str, longitude: f64, latitude: f64) -> Result<bool, SessionError> {
        let added = self.document_mut()?.add_point(name, longitude, latitude);
        self.dirty |= added;
        Ok(added)
    }

    /// UTMの点を変換して追加する。追加したら保存した経緯度を返す
    pub fn add_utm(
        &mut self,
        name: &str,
        x: f64,
        y: f64,
        zone: &str,
        datum: Option<&str>,
    ) -> Result<Option<(f64, f64)>, SessionError> {
        self.document_ref()?;
        let datum = datum.unwrap_or(self.datum.as_str());
        let (longitude, latitude) = transform(x, y, zone, datum)?;

        if self.add_lon_lat(name, longitude, latitude)? {
            Ok(Some((longitude, latitude)))
        } else {
            Ok(None)
        }
    }

    /// 座標リストファイルの点を全て追加する
    ///
    /// 失敗した点があっても他の点は続ける。測地系は行ごとの指定、
    /// なければセッションの既定値を使う。
    pub fn add_batch(&mut self, path: &Path) -> Result<BatchReport, SessionError> {
        self.document_ref()?;
        let extraction = self.extractors.extract(path)?;

        let mut report = BatchReport {
            warnings: extraction.warnings,
            ..Default::default()
        };
        for point in extraction.points {
            let datum = point.datum.as_deref().unwrap_or(self.datum.as_str());
            match transform(point.x, point.y, &point.zone_label, datum) {
                Ok((longitude, latitude)) => {
                    if self.add_lon_lat(&point.name, longitude, latitude)? {
                        report.added.push(PointRecord {
                            name: point.name,
                            longitude,
                            latitude,
                        });
                    } else {
                        report.duplicates.push(point.name);
                    }
                }
                Err(e) => {
                    warn!("Error adding point {}: {}", point.name, e);
                    report.failed.push((point.name, e.into()));
                }
            }
        }

        info!(
            "Batch {:?}: {} added, {} duplicates, {} failed",
            path,
            report.added.len(),
            report.duplicates.len(),
            report.failed.len()
        );
        Ok(report)
    }

    pub fn delete(&mut self, name: &str) -> Result<bool, SessionError> {
        let deleted = self.document_mut()?.delete_point(name);
        self.dirty |= deleted;
        Ok(deleted)
    }

    pub fn rename(&mut self, name: &str, new_name: &str) -> Result<bool, SessionError> {
        let renamed = self.document_mut()?.rename_point(name, new_name);
        self.dirty |= renamed;
        Ok(renamed)
    }

    pub fn relocate(&mut self, name: &str, longitude: f64, latitude: f64) -> Result<bool, SessionError> {
        let moved = self.document_mut()?.relocate_point(name, longitude, latitude);
        self.dirty |= moved;
        Ok(moved)
    }

    /// 先に変換するので、ゾーンが不正なら点は変わらない
    pub fn relocate_utm(
        &mut self,
        name: &str,
        x: f64,
        y: f64,
        zone: &str,
        datum: Option<&str>,
    ) -> Result<Option<(f64, f64)>, SessionError> {
        self.document_ref()?;
        let datum = datum.unwrap_or(self.datum.as_str());
        let (longitude, latitude) = transform(x, y, zone, datum)?;

        if self.relocate(name, longitude, latitude)? {
            Ok(Some((longitude, latitude)))
        } else {
            Ok(None)
        }
    }

    pub fn distances_all(&self, datum: Option<&str>) -> Result<(Datum, Vec<DistanceRecord>), SessionError> {
        let (datum, document) = self.distance_inputs(datum)?;
        Ok((datum, document.compute_distances_all(datum.as_str())?))
    }

    pub fn distances_line(&self, datum: Option<&str>) -> Result<(Datum, Vec<DistanceRecord>), SessionError> {
        let (datum, document) = self.distance_inputs(datum)?;
        Ok((datum, document.compute_distances_line(datum.as_str())?))
    }

    fn distance_inputs(&self, datum: Option<&str>) -> Result<(Datum, &KmzDocument), SessionError> {
        let document = self.document_ref()?;
        let datum = match datum {
            Some(d) => d.parse()?,
            None => self.datum,
        };

        let count = document.list_points().len();
        if count < 2 {
            return Err(SessionError::NotEnoughPoints(count));
        }
        Ok((datum, document))
    }

    fn document_ref(&self) -> Result<&KmzDocument, SessionError> {
        self.document.as_ref().ok_or(SessionError::NoDocument)
    }

    fn document_mut(&mut self) -> Result<&mut KmzDocument, SessionError> {
        self.document.as_mut().ok_or(SessionError::NoDocument)
    }
}

fn with_kmz_extension(path: &Path) -> PathBuf {
    if path.to_string_lossy().ends_with(KMZ_EXTENSION) {
        path.to_path_buf()
    } else {
        let mut with_ext = path.as_os_str().to_os_string();
        with_ext.push(KMZ_EXTENSION);
        PathBuf::from(with_ext)
    }
}
