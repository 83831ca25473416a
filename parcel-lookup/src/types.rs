//! Types de données pour le crate parcel-lookup

use std::fmt;

use geo::{BoundingRect, Centroid, GeometryCollection, Point, Rect};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};

use crate::LookupError;

/// Un point WGS84 (EPSG:4326)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LngLat {
    pub lon: f64,
    pub lat: f64,
}

impl LngLat {
    /// Construit un point en validant le domaine WGS84
    pub fn new(lon: f64, lat: f64) -> Result<Self, LookupError> {
        let valid = lon.is_finite()
            && lat.is_finite()
            && (-180.0..=180.0).contains(&lon)
            && (-90.0..=90.0).contains(&lat);
        if !valid {
            return Err(LookupError::InvalidCoordinates { lon, lat });
        }
        Ok(Self { lon, lat })
    }

    /// Conversion vers `geo`
    pub fn to_point(self) -> Point {
        Point::new(self.lon, self.lat)
    }
}

impl fmt::Display for LngLat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// Identifiant de parcelle propre à la juridiction (ex: borough-block-lot)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParcelId(String);

impl ParcelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Géométrie résolue d'une parcelle
///
/// Toujours portée comme une `FeatureCollection` WGS84, même quand le
/// service de géométrie renvoie une feature ou une géométrie isolée.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelGeometry {
    /// Identifiant obtenu à l'étape 1
    pub id: ParcelId,

    /// Features renvoyées à l'étape 2
    pub collection: FeatureCollection,
}

impl ParcelGeometry {
    pub fn new(id: ParcelId, collection: FeatureCollection) -> Self {
        Self { id, collection }
    }

    pub fn feature_count(&self) -> usize {
        self.collection.features.len()
    }

    /// Première feature de la collection
    pub fn first_feature(&self) -> Option<&Feature> {
        self.collection.features.first()
    }

    /// Type GeoJSON de la géométrie principale (première feature qui en porte une)
    pub fn primary_geometry_type(&self) -> Option<&'static str> {
        self.collection
            .features
            .iter()
            .find_map(|f| f.geometry.as_ref())
            .map(|g| geometry_type_name(&g.value))
    }

    /// Attributs de la première feature, dans l'ordre d'origine
    pub fn first_attributes(&self) -> Option<&JsonObject> {
        self.first_feature().and_then(|f| f.properties.as_ref())
    }

    /// Toutes les géométries converties vers `geo`
    pub fn to_geo(&self) -> Option<GeometryCollection> {
        let geojson = GeoJson::FeatureCollection(self.collection.clone());
        geojson::quick_collection(&geojson).ok()
    }

    /// Emprise de la parcelle
    pub fn bounding_rect(&self) -> Option<Rect> {
        self.to_geo().and_then(|gc| gc.bounding_rect())
    }

    /// Centroïde de la parcelle
    pub fn centroid(&self) -> Option<Point> {
        self.to_geo().and_then(|gc| gc.centroid())
    }
}

/// Nom du type GeoJSON d'une géométrie
pub fn geometry_type_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Une tentative de résolution, étiquetée par son numéro de séquence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParcelQuery {
    /// Strictement croissant au sein d'un résolveur
    pub request_id: u64,
    pub point: LngLat,
}

/// Résultat d'une résolution
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(ParcelGeometry),
    /// Aucune parcelle au point, ou échec d'un service
    NotFound,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    pub fn into_geometry(self) -> Option<ParcelGeometry> {
        match self {
            Resolution::Found(geometry) => Some(geometry),
            Resolution::NotFound => None,
        }
    }
}

/// Adresse sélectionnée par la recherche
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    /// Libellé affichable
    pub label: String,
    pub location: LngLat,
}

/// Valeur d'attribut scalaire rendue en texte (chaîne ou nombre)
pub fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
