use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{GeodesyError, LoadError, SaveError, Warning};
use crate::geodesy::DistanceCalculator;
use crate::model::{DistanceRecord, DocumentItem, Kml, Placemark, PointGeometry, PointRecord};
use crate::zip_handler::ZipHandler;

/// 読み込んだ文書と、読み込み時に見つかった警告
#[derive(Debug)]
pub struct Loaded {
    pub document: KmzDocument,
    pub warnings: Vec<Warning>,
}

/// KMZファイルのKML文書（メモリ上）
///
/// 名前を指定する操作は常にその名前の先頭のPlacemarkが対象になる。
#[derive(Debug, Clone, Default)]
pub struct KmzDocument {
    kml: Kml,
    file_path: Option<PathBuf>,
}

impl KmzDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_kml(kml: Kml) -> Self {
        Self {
            kml,
            file_path: None,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Loaded, LoadError> {
        let handler = ZipHandler::new(path);
        let kml = handler.read_kml()?;
        let document = Self {
            kml,
            file_path: Some(handler.path().to_path_buf()),
        };

        let mut warnings = Vec::new();
        let duplicates = document.duplicate_names();
        if !duplicates.is_empty() {
            warn!("Duplicate placemark names: {}", duplicates.join(", "));
            warnings.push(Warning::DuplicateNames { names: duplicates });
        }

        Ok(Loaded { document, warnings })
    }

    /// `path`、なければ前回読み込み・保存したパスへ保存し、書き込んだパスを返す
    pub fn save(&mut self, path: Option<&Path>) -> Result<PathBuf, SaveError> {
        let target = path
            .map(Path::to_path_buf)
            .or_else(|| self.file_path.clone())
            .ok_or(SaveError::NoPath)?;

        ZipHandler::new(&target).write_kml(&self.kml)?;
        self.file_path = Some(target.clone());
        Ok(target)
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn kml(&self) -> &Kml {
        &self.kml
    }

    /// 同名があれば追加せず false を返す
    pub fn add_point(&mut self, name: &str, longitude: f64, latitude: f64) -> bool {
        let exists = self
            .kml
            .document
            .placemarks()
            .any(|pm| pm.name.as_deref() == Some(name));
        if exists {
            warn!("A point with the name '{}' already exists", name);
            return false;
        }

        // 文書側の接頭辞 (`kml:` など) に合わせる
        let placemark =
            Placemark::with_prefix(self.kml.document.prefix.clone(), name, longitude, latitude);
        self.kml.document.items.push(DocumentItem::Placemark(placemark));
        info!("Added point {} at ({}, {})", name, longitude, latitude);
        true
    }

    /// `lon,lat` を読める点を文書順に返す
    ///
    /// `<Document>` 直下のPlacemarkだけが対象。`<Folder>` 内のものは保存時に
    /// そのまま書き戻されるが、一覧・編集・距離計算には含まれない。
    pub fn list_points(&self) -> Vec<PointRecord> {
        self.kml
            .document
            .placemarks()
            .filter_map(|pm| {
                pm.position().map(|pos| PointRecord {
                    name: pm.display_name().to_string(),
                    longitude: pos.longitude,
                    latitude: pos.latitude,
                })
            })
            .collect()
    }

    /// `name` の先頭のPlacemarkの名前変更・移動
    ///
    /// 移動は `(経度, 緯度)` の組で指定し、既存の高度は残す。
    /// `<Point>` がなければ作る。
    pub fn update_point(
        &mut self,
        name: &str,
        new_name: Option<&str>,
        new_position: Option<(f64, f64)>,
    ) -> bool {
        let Some(placemark) = self.find_mut(name) else {
            return false;
        };

        if let Some(new_name) = new_name {
            placemark.name = Some(new_name.to_string());
        }
        if let Some((longitude, latitude)) = new_position {
            let prefix = placemark.prefix.clone();
            placemark
                .point
                .get_or_insert_with(|| PointGeometry::with_prefix(prefix))
                .relocate(longitude, latitude);
        }

        info!(
            "Updated point {} (rename: {:?}, relocate: {:?})",
            name, new_name, new_position
        );
        true
    }

    pub fn rename_point(&mut self, name: &str, new_name: &str) -> bool {
        self.update_point(name, Some(new_name), None)
    }

    pub fn relocate_point(&mut self, name: &str, longitude: f64, latitude: f64) -> bool {
        self.update_point(name, None, Some((longitude, latitude)))
    }

    pub fn delete_point(&mut self, name: &str) -> bool {
        let index = self.kml.document.items.iter().position(
            |item| matches!(item, DocumentItem::Placemark(pm) if pm.name.as_deref() == Some(name)),
        );

        match index {
            Some(index) => {
                self.kml.document.items.remove(index);
                info!("Deleted point {}", name);
                true
            }
            None => false,
        }
    }

    /// 2回以上現れる名前（初出順）
    pub fn duplicate_names(&self) -> Vec<String> {
        let points = self.list_points();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for point in &points {
            *counts.entry(point.name.as_str()).or_default() += 1;
        }

        let mut duplicates: Vec<String> = Vec::new();
        for point in &points {
            if counts[point.name.as_str()] > 1 && !duplicates.contains(&point.name) {
                duplicates.push(point.name.clone());
            }
        }
        duplicates
    }

    /// `i < j` の全ての組 `(i, j)` の距離（添字順）
    pub fn compute_distances_all(&self, ellipsoid: &str) -> Result<Vec<DistanceRecord>, GeodesyError> {
        let calculator = DistanceCalculator::for_name(ellipsoid)?;
        let points = self.list_points();

        let mut distances = Vec::with_capacity(points.len() * points.len().saturating_sub(1) / 2);
        for (i, p1) in points.iter().enumerate() {
            for p2 in &points[i + 1..] {
                distances.push(measure(&calculator, p1, p2));
            }
        }
        Ok(distances)
    }

    /// 文書順で隣り合う点の距離
    pub fn compute_distances_line(&self, ellipsoid: &str) -> Result<Vec<DistanceRecord>, GeodesyError> {
        let calculator = DistanceCalculator::for_name(ellipsoid)?;
        let points = self.list_points();

        Ok(points
            .windows(2)
            .map(|pair| measure(&calculator, &pair[0], &pair[1]))
            .collect())
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Placemark> {
        self.kml
            .document
            .placemarks_mut()
            .find(|pm| pm.name.as_deref() == Some(name))
    }
}

fn measure(calculator: &DistanceCalculator, p1: &PointRecord, p2: &PointRecord) -> DistanceRecord {
    DistanceRecord {
        from: p1.name.clone(),
        to: p2.name.clone(),
        meters: calculator.distance(p1.longitude, p1.latitude, p2.longitude, p2.latitude),
    }
}
