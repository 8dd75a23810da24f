//! 準拠楕円体上の測地線距離

use geographiclib_rs::{Geodesic, InverseGeodesic};

use crate::error::GeodesyError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    pub name: &'static str,
    /// 長半径 (m)
    pub a: f64,
    /// 扁平率
    pub f: f64,
}

const WGS84: Ellipsoid = Ellipsoid {
    name: "WGS84",
    a: 6_378_137.0,
    f: 1.0 / 298.257_223_563,
};

const GRS80: Ellipsoid = Ellipsoid {
    name: "GRS80",
    a: 6_378_137.0,
    f: 1.0 / 298.257_222_101,
};

const CLRK66: Ellipsoid = Ellipsoid {
    name: "clrk66",
    a: 6_378_206.4,
    f: 1.0 / 294.978_698_213_898,
};

// proj の楕円体名と測地系の別名
const ELLIPSOIDS: &[(&str, Ellipsoid)] = &[
    ("WGS84", WGS84),
    ("GRS80", GRS80),
    ("NAD83", GRS80),
    ("ETRS89", GRS80),
    ("NAD27", CLRK66),
    ("clrk66", CLRK66),
    (
        "WGS72",
        Ellipsoid {
            name: "WGS72",
            a: 6_378_135.0,
            f: 1.0 / 298.26,
        },
    ),
    (
        "clrk80",
        Ellipsoid {
            name: "clrk80",
            a: 6_378_249.145,
            f: 1.0 / 293.4663,
        },
    ),
    (
        "intl",
        Ellipsoid {
            name: "intl",
            a: 6_378_388.0,
            f: 1.0 / 297.0,
        },
    ),
    (
        "bessel",
        Ellipsoid {
            name: "bessel",
            a: 6_377_397.155,
            f: 1.0 / 299.152_812_8,
        },
    ),
    (
        "airy",
        Ellipsoid {
            name: "airy",
            a: 6_377_563.396,
            f: 1.0 / 299.324_964_6,
        },
    ),
    (
        "krass",
        Ellipsoid {
            name: "krass",
            a: 6_378_245.0,
            f: 1.0 / 298.3,
        },
    ),
    (
        "sphere",
        Ellipsoid {
            name: "sphere",
            a: 6_370_997.0,
            f: 0.0,
        },
    ),
];

impl Ellipsoid {
    /// 楕円体名・測地系名で探す（大文字小文字は区別しない）
    pub fn from_name(name: &str) -> Result<Self, GeodesyError> {
        ELLIPSOIDS
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, ellipsoid)| *ellipsoid)
            .ok_or_else(|| GeodesyError::UnknownEllipsoid(name.to_string()))
    }

    pub fn known_names() -> impl Iterator<Item = &'static str> {
        ELLIPSOIDS.iter().map(|(key, _)| *key)
    }

    pub fn geodesic(&self) -> Geodesic {
        Geodesic::new(self.a, self.f)
    }
}

/// ひとつの楕円体に対する測地線の逆問題
pub struct DistanceCalculator {
    geodesic: Geodesic,
}

impl DistanceCalculator {
    pub fn new(ellipsoid: Ellipsoid) -> Self {
        Self {
            geodesic: ellipsoid.geodesic(),
        }
    }

    pub fn for_name(name: &str) -> Result<Self, GeodesyError> {
        Ok(Self::new(Ellipsoid::from_name(name)?))
    }

    /// 2点間の測地線長 (m)。引数は経度, 緯度の順
    pub fn distance(&self, lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
        let s12: f64 = self.geodesic.inverse(lat1, lon1, lat2, lon2);
        s12
    }
}

/// 2点（経度, 緯度）間の測地線長 (m)
pub fn distance(
    ellipsoid: &str,
    lon1: f64,
    lat1: f64,
    lon2: f64,
    lat2: f64,
) -> Result<f64, GeodesyError> {
    Ok(DistanceCalculator::for_name(ellipsoid)?.distance(lon1, lat1, lon2, lat2))
}
