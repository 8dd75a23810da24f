use quick_xml::events::Event;

pub const KML_NS: &str = "http://www.opengis.net/kml/2.2";

/// 名前なしPlacemarkの一覧表示名
pub const UNNAMED: &str = "Unnamed";

/// 元の文書の属性（値はエスケープされたまま）
pub type RawAttribute = (String, String);

/// 解釈しない要素をそのまま保持する（保存時に再出力）
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    pub events: Vec<Event<'static>>,
}

impl RawElement {
    pub fn new(events: Vec<Event<'static>>) -> Self {
        Self { events }
    }
}

/// `lon,lat[,alt]` の座標値
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub longitude: f64,
    pub latitude: f64,
    /// 高度は元のテキストのまま保持する
    pub altitude: Option<String>,
}

impl Position {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude: None,
        }
    }

    /// 座標テキストを読む。空白区切りの最初の組だけを使い、
    /// カンマ区切りの空の部分は捨てる
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let parts: Vec<&str> = first.split(',').filter(|p| !p.is_empty()).collect();
        if parts.len() < 2 {
            return None;
        }

        let longitude = parts[0].trim().parse().ok()?;
        let latitude = parts[1].trim().parse().ok()?;
        let altitude = parts.get(2).map(|alt| alt.to_string());

        Some(Self {
            longitude,
            latitude,
            altitude,
        })
    }

    pub fn to_coordinates_text(&self) -> String {
        match &self.altitude {
            Some(alt) => format!("{},{},{}", self.longitude, self.latitude, alt),
            None => format!("{},{}", self.longitude, self.latitude),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Coordinates {
    Valid(Position),
    /// 解釈できなかった `<coordinates>` の中身
    Invalid(String),
}

impl Coordinates {
    pub fn from_text(text: &str) -> Self {
        match Position::parse(text) {
            Some(position) => Coordinates::Valid(position),
            None => Coordinates::Invalid(text.to_string()),
        }
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            Coordinates::Valid(position) => Some(position),
            Coordinates::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointGeometry {
    pub prefix: Option<String>,
    pub attributes: Vec<RawAttribute>,
    pub coordinates_prefix: Option<String>,
    pub coordinates: Option<Coordinates>,
    /// `<extrude>` や `<altitudeMode>` など
    pub extra: Vec<RawElement>,
}

impl PointGeometry {
    /// 新しい `<Point>`。接頭辞は `<coordinates>` にも使う
    pub fn with_prefix(prefix: Option<String>) -> Self {
        Self {
            coordinates_prefix: prefix.clone(),
            prefix,
            ..Default::default()
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.coordinates.as_ref().and_then(Coordinates::position)
    }

    /// 点を移動する。既存の高度は残す
    pub fn relocate(&mut self, longitude: f64, latitude: f64) {
        let altitude = self.position().and_then(|p| p.altitude.clone());
        self.coordinates = Some(Coordinates::Valid(Position {
            longitude,
            latitude,
            altitude,
        }));
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Placemark {
    /// 名前空間接頭辞。`None` なら既定の名前空間
    pub prefix: Option<String>,
    pub attributes: Vec<RawAttribute>,
    pub name_prefix: Option<String>,
    pub name: Option<String>,
    pub point: Option<PointGeometry>,
    /// `<name>` と最初の `<Point>` 以外の子要素（元の順）
    pub extra: Vec<RawElement>,
}

impl Placemark {
    pub fn new(name: &str, longitude: f64, latitude: f64) -> Self {
        Self::with_prefix(None, name, longitude, latitude)
    }

    /// 接頭辞付きの文書に追加するときは子要素も同じ接頭辞にする
    pub fn with_prefix(prefix: Option<String>, name: &str, longitude: f64, latitude: f64) -> Self {
        let mut point = PointGeometry::with_prefix(prefix.clone());
        point.coordinates = Some(Coordinates::Valid(Position::new(longitude, latitude)));

        Self {
            name_prefix: prefix.clone(),
            prefix,
            attributes: Vec::new(),
            name: Some(name.to_string()),
            point: Some(point),
            extra: Vec::new(),
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.point.as_ref().and_then(PointGeometry::position)
    }

    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => UNNAMED,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentItem {
    Placemark(Placemark),
    Raw(RawElement),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub prefix: Option<String>,
    pub attributes: Vec<RawAttribute>,
    pub items: Vec<DocumentItem>,
}

impl Document {
    pub fn placemarks(&self) -> impl Iterator<Item = &Placemark> {
        self.items.iter().filter_map(|item| match item {
            DocumentItem::Placemark(pm) => Some(pm),
            DocumentItem::Raw(_) => None,
        })
    }

    pub fn placemarks_mut(&mut self) -> impl Iterator<Item = &mut Placemark> {
        self.items.iter_mut().filter_map(|item| match item {
            DocumentItem::Placemark(pm) => Some(pm),
            DocumentItem::Raw(_) => None,
        })
    }
}

/// `<kml>` ルート要素
#[derive(Debug, Clone, PartialEq)]
pub struct Kml {
    pub prefix: Option<String>,
    pub attributes: Vec<RawAttribute>,
    /// `<Document>` より前のルート直下の要素
    pub leading: Vec<RawElement>,
    pub document: Document,
    /// `<Document>` より後のルート直下の要素
    pub trailing: Vec<RawElement>,
}

impl Default for Kml {
    fn default() -> Self {
        Self {
            prefix: None,
            attributes: vec![("xmlns".to_string(), KML_NS.to_string())],
            leading: Vec::new(),
            document: Document::default(),
            trailing: Vec::new(),
        }
    }
}

/// 一覧表示用の点
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistanceRecord {
    pub from: String,
    pub to: String,
    pub meters: f64,
}
