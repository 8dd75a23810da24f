//! UTM座標から経緯度 (EPSG:4326) への変換
//!
//! ゾーン記号と測地系から変換元の座標系を決め、`proj4rs` で投影する。
//! 軸順は入力が x/y、出力が経度/緯度。

use proj4rs::proj::Proj;
use proj4rs::transform::transform as proj_transform;
use tracing::debug;

use crate::error::TranslationError;

pub const DEFAULT_DATUM: &str = "WGS84";

/// EPSG:4326
const GEOGRAPHIC_PROJ: &str = "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
}

/// `30T` のようなゾーン記号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneLabel {
    pub number: u32,
    pub designator: String,
}

impl ZoneLabel {
    /// 数字を全部つなげてゾーン番号、英字を全部つなげて大文字化したものを帯記号とする
    pub fn parse(label: &str) -> Result<Self, TranslationError> {
        let digits: String = label.chars().filter(|c| c.is_ascii_digit()).collect();
        let designator: String = label
            .chars()
            .filter(|c| c.is_alphabetic())
            .collect::<String>()
            .to_uppercase();

        let invalid = |reason: &str| TranslationError::InvalidZoneLabel {
            label: label.to_string(),
            reason: reason.to_string(),
        };

        if digits.is_empty() {
            return Err(invalid("no zone number"));
        }
        if designator.is_empty() {
            return Err(invalid("no zone letter"));
        }
        let number = digits
            .parse::<u32>()
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(Self { number, designator })
    }

    /// `N` より前は南半球、`N` 以降は北半球
    ///
    /// MGRSの緯度帯の規則を帯記号の文字列全体に当てはめている。
    /// 極域の帯 (A, B, Y, Z) は特別扱いしない。
    pub fn hemisphere(&self) -> Hemisphere {
        if self.designator.as_str() >= "N" {
            Hemisphere::North
        } else {
            Hemisphere::South
        }
    }
}

/// ゾーン記号から決まる投影座標系
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtmCrs {
    /// EPSG:326xx / 327xx
    Wgs84 { zone: u32, hemisphere: Hemisphere },
    /// EPSG:258xx（ゾーン28〜31のみ）
    Etrs89 { zone: u32 },
}

impl UtmCrs {
    pub fn select(zone: &ZoneLabel, datum: &str) -> Result<Self, TranslationError> {
        if !(1..=60).contains(&zone.number) {
            return Err(TranslationError::UnsupportedZone { zone: zone.number });
        }

        if datum.eq_ignore_ascii_case("ETRS89") && (28..=31).contains(&zone.number) {
            return Ok(UtmCrs::Etrs89 { zone: zone.number });
        }

        // それ以外の測地系はWGS84のUTMにフォールバック
        Ok(UtmCrs::Wgs84 {
            zone: zone.number,
            hemisphere: zone.hemisphere(),
        })
    }

    pub fn epsg(&self) -> u32 {
        match *self {
            UtmCrs::Wgs84 {
                zone,
                hemisphere: Hemisphere::North,
            } => 32600 + zone,
            UtmCrs::Wgs84 {
                zone,
                hemisphere: Hemisphere::South,
            } => 32700 + zone,
            UtmCrs::Etrs89 { zone } => 25800 + zone,
        }
    }

    pub fn proj_string(&self) -> String {
        match *self {
            UtmCrs::Wgs84 {
                zone,
                hemisphere: Hemisphere::North,
            } => format!("+proj=utm +zone={zone} +datum=WGS84 +units=m +no_defs"),
            UtmCrs::Wgs84 {
                zone,
                hemisphere: Hemisphere::South,
            } => format!("+proj=utm +zone={zone} +south +datum=WGS84 +units=m +no_defs"),
            UtmCrs::Etrs89 { zone } => format!(
                "+proj=utm +zone={zone} +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
            ),
        }
    }
}

/// ゾーン記号と測地系から使うEPSGコードを求める
pub fn resolve_epsg(zone_label: &str, datum: &str) -> Result<u32, TranslationError> {
    let zone = ZoneLabel::parse(zone_label)?;
    Ok(UtmCrs::select(&zone, datum)?.epsg())
}

/// UTMの東距・北距を `(経度, 緯度)`（度）に変換する
///
/// `datum` はEPSGの選択にだけ使い、未知の名前はWGS84のUTMになる。
pub fn transform(
    x: f64,
    y: f64,
    zone_label: &str,
    datum: &str,
) -> Result<(f64, f64), TranslationError> {
    let zone = ZoneLabel::parse(zone_label)?;
    let crs = UtmCrs::select(&zone, datum)?;
    let epsg = crs.epsg();

    let projection_error = |source| TranslationError::Projection { epsg, source };
    let src = Proj::from_proj_string(&crs.proj_string()).map_err(projection_error)?;
    let dst = Proj::from_proj_string(GEOGRAPHIC_PROJ).map_err(projection_error)?;

    let mut point = (x, y, 0.0);
    proj_transform(&src, &dst, &mut point)
        .map_err(|source| TranslationError::Transform { x, y, epsg, source })?;

    // proj4rs は地理座標をラジアンで返す
    let (lon, lat) = (point.0.to_degrees(), point.1.to_degrees());
    if !lon.is_finite() || !lat.is_finite() {
        return Err(TranslationError::OutOfDomain { x, y, epsg });
    }

    debug!(
        "EPSG:{} ({}, {}) -> EPSG:4326 ({}, {})",
        epsg, x, y, lon, lat
    );
    Ok((lon, lat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_label_parse() {
        let zone = ZoneLabel::parse("30T").unwrap();
        assert_eq!(zone.number, 30);
        assert_eq!(zone.designator, "T");
        assert_eq!(zone.hemisphere(), Hemisphere::North);

        // 数字と英字は位置に関係なく集める
        let zone = ZoneLabel::parse("h3x3").unwrap();
        assert_eq!(zone.number, 33);
        assert_eq!(zone.designator, "HX");

        assert_eq!(ZoneLabel::parse("19m").unwrap().hemisphere(), Hemisphere::South);
        assert_eq!(ZoneLabel::parse("33N").unwrap().hemisphere(), Hemisphere::North);
        assert_eq!(ZoneLabel::parse("31C").unwrap().hemisphere(), Hemisphere::South);
    }

    #[test]
    fn test_zone_label_malformed() {
        for label in ["T", "30", "", "--", "99999999999999999999X"] {
            let err = ZoneLabel::parse(label).unwrap_err();
            assert!(
                matches!(err, TranslationError::InvalidZoneLabel { .. }),
                "label {:?} gave {:?}",
                label,
                err
            );
        }
    }

    #[test]
    fn test_epsg_selection() {
        assert_eq!(resolve_epsg("30T", "WGS84").unwrap(), 32630);
        assert_eq!(resolve_epsg("30T", "ETRS89").unwrap(), 25830);
        assert_eq!(resolve_epsg("30T", "etrs89").unwrap(), 25830);
        assert_eq!(resolve_epsg("28R", "ETRS89").unwrap(), 25828);
        assert_eq!(resolve_epsg("31S", "ETRS89").unwrap(), 25831);
        assert_eq!(resolve_epsg("33N", "ETRS89").unwrap(), 32633);
        assert_eq!(resolve_epsg("33M", "ETRS89").unwrap(), 32733);
        assert_eq!(resolve_epsg("18T", "NAD83").unwrap(), 32618);
        assert_eq!(resolve_epsg("18G", "Potsdam").unwrap(), 32718);
    }

    #[test]
    fn test_zone_out_of_range() {
        assert!(matches!(
            resolve_epsg("0N", "WGS84"),
            Err(TranslationError::UnsupportedZone { zone: 0 })
        ));
        assert!(matches!(
            resolve_epsg("61N", "WGS84"),
            Err(TranslationError::UnsupportedZone { zone: 61 })
        ));
    }

    #[test]
    fn test_transform_zone_30t() {
        let (lon, lat) = transform(500000.0, 4649776.0, "30T", "WGS84").unwrap();

        // 中央子午線上なので経度は -3°
        assert!((lon - -3.0).abs() < 1e-6, "lon = {}", lon);
        assert!((lat - 42.0).abs() < 0.01, "lat = {}", lat);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let a = transform(463712.5, 4469224.7, "30T", "WGS84").unwrap();
        let b = transform(463712.5, 4469224.7, "30T", "WGS84").unwrap();
        assert!((a.0 - b.0).abs() < 1e-9);
        assert!((a.1 - b.1).abs() < 1e-9);

        // マドリード付近
        assert!((a.0 - -3.43).abs() < 0.05, "lon = {}", a.0);
        assert!((a.1 - 40.37).abs() < 0.05, "lat = {}", a.1);
    }

    #[test]
    fn test_transform_etrs89_close_to_wgs84() {
        let wgs = transform(500000.0, 4649776.0, "30T", "WGS84").unwrap();
        let etrs = transform(500000.0, 4649776.0, "30T", "ETRS89").unwrap();

        // 1e-4度 ≒ 10m 以内
        assert!((wgs.0 - etrs.0).abs() < 1e-4);
        assert!((wgs.1 - etrs.1).abs() < 1e-4);
    }

    #[test]
    fn test_transform_southern_hemisphere() {
        // 南半球は偽北距 10,000,000m
        let (lon, lat) = transform(500000.0, 5000000.0, "19H", "WGS84").unwrap();
        assert!((lon - -69.0).abs() < 1e-6, "lon = {}", lon);
        assert!(lat < -44.0 && lat > -46.0, "lat = {}", lat);
    }

    #[test]
    fn test_transform_non_finite_input() {
        // ゾーン記号は正しいので InvalidZoneLabel にはならない
        for (x, y) in [(f64::NAN, 4649776.0), (500000.0, f64::INFINITY)] {
            let err = transform(x, y, "30T", "WGS84").unwrap_err();
            assert!(
                matches!(
                    err,
                    TranslationError::OutOfDomain { epsg: 32630, .. }
                        | TranslationError::Transform { epsg: 32630, .. }
                ),
                "({}, {}) gave {:?}",
                x,
                y,
                err
            );
        }
    }

    #[test]
    fn test_transform_malformed_zone() {
        let err = transform(500000.0, 4649776.0, "thirty", "WGS84").unwrap_err();
        assert!(matches!(err, TranslationError::InvalidZoneLabel { .. }));
        assert!(err.to_string().contains("thirty"));
    }
}
