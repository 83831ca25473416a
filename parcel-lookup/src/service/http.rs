//! Implémentations HTTP des services géographiques
//!
//! Chaque endpoint est décrit par un gabarit d'URL (`{lat}`, `{lon}`,
//! `{id}`, `{text}`); les valeurs substituées sont encodées pour l'URL.

use std::time::Duration;

use async_trait::async_trait;
use geojson::{Feature, FeatureCollection, GeoJson, JsonValue};
use regex::Regex;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GeometryLookup, PlaceSearch, PointLookup};
use crate::{LngLat, LookupError, ParcelId, Place};

/// User-Agent envoyé à tous les services
pub const USER_AGENT: &str = concat!("parcel-lookup/", env!("CARGO_PKG_VERSION"));

/// Endpoints des services de résolution
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub point: PointServiceConfig,
    pub geometry: GeometryServiceConfig,

    /// Recherche d'adresse (désactivée si absente)
    #[serde(default)]
    pub search: Option<PlaceSearchConfig>,
}

/// Service point → identifiant
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PointServiceConfig {
    /// Gabarit avec `{lat}` et `{lon}`
    pub url: String,

    /// Chemin pointé de l'identifiant dans la première feature
    /// (ex: `properties.addendum.pad.bbl`)
    pub id_path: String,
}

/// Identifiants acceptés par défaut: alphanumériques, `.`, `_`, `-`
pub const DEFAULT_ID_PATTERN: &str = r"^[0-9A-Za-z][0-9A-Za-z._\-]{0,63}$";

/// Service identifiant → géométrie
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeometryServiceConfig {
    /// Gabarit avec `{id}`
    pub url: String,

    /// Expression régulière que doit vérifier l'identifiant avant la requête
    #[serde(default = "default_id_pattern")]
    pub id_pattern: String,
}

impl GeometryServiceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            id_pattern: default_id_pattern(),
        }
    }
}

fn default_id_pattern() -> String {
    DEFAULT_ID_PATTERN.to_string()
}

/// Service de recherche d'adresse
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaceSearchConfig {
    /// Gabarit avec `{text}`
    pub url: String,

    /// Chemin pointé du libellé dans la feature trouvée
    #[serde(default = "default_label_path")]
    pub label_path: String,

    /// Le service refuse les requêtes sans `api_key`
    #[serde(default)]
    pub api_key_required: bool,
}

fn default_label_path() -> String {
    "properties.label".to_string()
}

/// Crée le client HTTP partagé par les services
///
/// Sans `timeout`, aucune limite côté client: seule l'erreur du transport
/// met fin à une requête bloquée.
pub fn build_client(timeout: Option<Duration>) -> Result<Client, LookupError> {
    let mut builder = Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Recherche inverse point → identifiant de parcelle
pub struct HttpPointLookup {
    client: Client,
    config: PointServiceConfig,
}

impl HttpPointLookup {
    pub fn new(client: Client, config: PointServiceConfig) -> Result<Self, LookupError> {
        check_template(&config.url, "{lat}")?;
        check_template(&config.url, "{lon}")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PointLookup for HttpPointLookup {
    async fn parcel_id(&self, point: LngLat) -> Result<Option<ParcelId>, LookupError> {
        const SERVICE: &str = "point lookup";

        let (lat, lon) = (point.lat.to_string(), point.lon.to_string());
        let url = render_template(
            &self.config.url,
            &[("{lat}", lat.as_str()), ("{lon}", lon.as_str())],
        );
        debug!(url = %url, "Reverse lookup");

        let response = self.client.get(&url).send().await?;
        check_status(SERVICE, &response)?;
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| LookupError::invalid_response(SERVICE, e.to_string()))?;

        let features = body
            .get("features")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| LookupError::invalid_response(SERVICE, "missing features array"))?;

        let Some(first) = features.first() else {
            debug!(point = %point, "No match at point");
            return Ok(None);
        };

        let id = value_at_path(first, &self.config.id_path).and_then(identifier_from_value);
        if id.is_none() {
            debug!(point = %point, path = %self.config.id_path, "Match carries no identifier");
        }
        Ok(id)
    }
}

/// Géométrie d'une parcelle filtrée par identifiant
pub struct HttpGeometryLookup {
    client: Client,
    config: GeometryServiceConfig,
    id_pattern: Regex,
}

impl HttpGeometryLookup {
    pub fn new(client: Client, config: GeometryServiceConfig) -> Result<Self, LookupError> {
        check_template(&config.url, "{id}")?;
        let id_pattern = Regex::new(&config.id_pattern).map_err(|source| LookupError::Pattern {
            pattern: config.id_pattern.clone(),
            source,
        })?;
        Ok(Self {
            client,
            config,
            id_pattern,
        })
    }
}

#[async_trait]
impl GeometryLookup for HttpGeometryLookup {
    async fn parcel_geometry(&self, id: &ParcelId) -> Result<FeatureCollection, LookupError> {
        const SERVICE: &str = "geometry lookup";

        // L'identifiant finit dans un filtre côté service
        if !self.id_pattern.is_match(id.as_str()) {
            return Err(LookupError::InvalidIdentifier(id.to_string()));
        }

        let url = render_template(&self.config.url, &[("{id}", id.as_str())]);
        debug!(url = %url, "Geometry lookup");

        let response = self.client.get(&url).send().await?;
        check_status(SERVICE, &response)?;
        let text = response.text().await?;

        let geojson = text
            .parse::<GeoJson>()
            .map_err(|e| LookupError::invalid_response(SERVICE, e.to_string()))?;

        Ok(into_collection(geojson))
    }
}

/// Recherche d'adresse sur un endpoint de type Pelias (`/search?text=`)
pub struct HttpPlaceSearch {
    client: Client,
    config: PlaceSearchConfig,
    api_key: Option<String>,
}

impl HttpPlaceSearch {
    pub fn new(
        client: Client,
        config: PlaceSearchConfig,
        api_key: Option<String>,
    ) -> Result<Self, LookupError> {
        check_template(&config.url, "{text}")?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl PlaceSearch for HttpPlaceSearch {
    async fn search(&self, text: &str) -> Result<Option<Place>, LookupError> {
        const SERVICE: &str = "address search";

        let url = render_template(&self.config.url, &[("{text}", text)]);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key)]);
        }

        let response = request.send().await?;
        check_status(SERVICE, &response)?;
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| LookupError::invalid_response(SERVICE, e.to_string()))?;

        let Some(first) = body
            .get("features")
            .and_then(JsonValue::as_array)
            .and_then(|features| features.first())
        else {
            return Ok(None);
        };

        let coordinates = value_at_path(first, "geometry.coordinates")
            .and_then(JsonValue::as_array)
            .filter(|c| c.len() >= 2)
            .ok_or_else(|| LookupError::invalid_response(SERVICE, "feature without point"))?;
        let lon = coordinates[0].as_f64();
        let lat = coordinates[1].as_f64();
        let (Some(lon), Some(lat)) = (lon, lat) else {
            return Err(LookupError::invalid_response(SERVICE, "non-numeric coordinates"));
        };

        let label = value_at_path(first, &self.config.label_path)
            .and_then(JsonValue::as_str)
            .unwrap_or(text)
            .to_string();

        Ok(Some(Place {
            label,
            location: LngLat::new(lon, lat)?,
        }))
    }
}

/// Vérifie qu'un gabarit contient le paramètre attendu
fn check_template(template: &str, placeholder: &'static str) -> Result<(), LookupError> {
    if template.contains(placeholder) {
        Ok(())
    } else {
        Err(LookupError::Template {
            template: template.to_string(),
            placeholder,
        })
    }
}

/// Substitue les paramètres d'un gabarit, valeurs encodées pour l'URL
fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |url, (placeholder, value)| {
            url.replace(placeholder, &urlencoding::encode(value))
        })
}

fn check_status(service: &'static str, response: &Response) -> Result<(), LookupError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(LookupError::Status {
            service,
            status: status.as_u16(),
        })
    }
}

/// Descend dans un document JSON selon un chemin pointé (`a.b.0.c`)
fn value_at_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            JsonValue::Object(map) => map.get(segment),
            JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Identifiant non vide, texte ou numérique
fn identifier_from_value(value: &JsonValue) -> Option<ParcelId> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(ParcelId::new(s.trim())),
        JsonValue::Number(n) => Some(ParcelId::new(n.to_string())),
        _ => None,
    }
}

/// Normalise toute réponse GeoJSON en FeatureCollection
fn into_collection(geojson: GeoJson) -> FeatureCollection {
    let features = match geojson {
        GeoJson::FeatureCollection(collection) => return collection,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature::from(geometry)],
    };
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const REVERSE_BODY: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [-73.935242, 40.730610]},
            "properties": {"label": "1 Test St", "addendum": {"pad": {"bbl": "1-23-45"}}}
        }]
    }"#;

    const PARCEL_BODY: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]},
            "properties": {"BldgClass": "R4", "LotArea": 2500}
        }]
    }"#;

    fn point_lookup(server: &Server) -> HttpPointLookup {
        HttpPointLookup::new(
            build_client(None).unwrap(),
            PointServiceConfig {
                url: format!(
                    "{}/v2/reverse?point.lat={{lat}}&point.lon={{lon}}&size=1",
                    server.url()
                ),
                id_path: "properties.addendum.pad.bbl".to_string(),
            },
        )
        .unwrap()
    }

    fn geometry_lookup(server: &Server) -> HttpGeometryLookup {
        HttpGeometryLookup::new(
            build_client(None).unwrap(),
            GeometryServiceConfig::new(format!("{}/parcels.geojson?bbl={{id}}", server.url())),
        )
        .unwrap()
    }

    fn reverse_query() -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("point.lat".into(), "40.73061".into()),
            Matcher::UrlEncoded("point.lon".into(), "-73.935242".into()),
        ])
    }

    fn test_point() -> LngLat {
        LngLat::new(-73.935242, 40.730610).unwrap()
    }

    #[tokio::test]
    async fn test_point_lookup_reads_nested_identifier() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/reverse")
            .match_query(reverse_query())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(REVERSE_BODY)
            .create_async()
            .await;

        let id = point_lookup(&server).parcel_id(test_point()).await.unwrap();
        assert_eq!(id, Some(ParcelId::new("1-23-45")));
    }

    #[tokio::test]
    async fn test_point_lookup_no_match() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/reverse")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"type": "FeatureCollection", "features": []}"#)
            .create_async()
            .await;

        let id = point_lookup(&server).parcel_id(test_point()).await.unwrap();
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn test_point_lookup_match_without_identifier() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/reverse")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"features": [{"type": "Feature", "properties": {"addendum": {"pad": {"bbl": ""}}}}]}"#,
            )
            .create_async()
            .await;

        let id = point_lookup(&server).parcel_id(test_point()).await.unwrap();
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn test_point_lookup_numeric_identifier() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/reverse")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"features": [{"properties": {"addendum": {"pad": {"bbl": 1000010010}}}}]}"#)
            .create_async()
            .await;

        let id = point_lookup(&server).parcel_id(test_point()).await.unwrap();
        assert_eq!(id, Some(ParcelId::new("1000010010")));
    }

    #[tokio::test]
    async fn test_point_lookup_server_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/reverse")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = point_lookup(&server).parcel_id(test_point()).await.unwrap_err();
        assert!(matches!(err, LookupError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_geometry_lookup_collection() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/parcels.geojson")
            .match_query(Matcher::UrlEncoded("bbl".into(), "1-23-45".into()))
            .with_status(200)
            .with_body(PARCEL_BODY)
            .create_async()
            .await;

        let collection = geometry_lookup(&server)
            .parcel_geometry(&ParcelId::new("1-23-45"))
            .await
            .unwrap();
        assert_eq!(collection.features.len(), 1);
    }

    #[tokio::test]
    async fn test_geometry_lookup_wraps_bare_feature() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/parcels.geojson")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]}, "properties": null}"#,
            )
            .create_async()
            .await;

        let collection = geometry_lookup(&server)
            .parcel_geometry(&ParcelId::new("1000010010"))
            .await
            .unwrap();
        assert_eq!(collection.features.len(), 1);
    }

    #[tokio::test]
    async fn test_geometry_lookup_rejects_suspicious_identifier() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/parcels.geojson")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = geometry_lookup(&server)
            .parcel_geometry(&ParcelId::new("1' OR '1'='1"))
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::InvalidIdentifier(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_geometry_lookup_invalid_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/parcels.geojson")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = geometry_lookup(&server)
            .parcel_geometry(&ParcelId::new("1-23-45"))
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_place_search_first_match() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("text".into(), "1 Test St".into()),
                Matcher::UrlEncoded("api_key".into(), "secret".into()),
            ]))
            .with_status(200)
            .with_body(REVERSE_BODY)
            .create_async()
            .await;

        let search = HttpPlaceSearch::new(
            build_client(None).unwrap(),
            PlaceSearchConfig {
                url: format!("{}/v2/search?text={{text}}", server.url()),
                label_path: default_label_path(),
                api_key_required: true,
            },
            Some("secret".to_string()),
        )
        .unwrap();

        let place = search.search("1 Test St").await.unwrap().unwrap();
        assert_eq!(place.label, "1 Test St");
        assert_eq!(place.location, test_point());
    }

    #[test]
    fn test_template_validation() {
        let result = HttpGeometryLookup::new(
            build_client(None).unwrap(),
            GeometryServiceConfig::new("http://localhost/parcels"),
        );
        assert!(matches!(
            result,
            Err(LookupError::Template { placeholder: "{id}", .. })
        ));
    }

    #[test]
    fn test_invalid_identifier_pattern() {
        let mut config = GeometryServiceConfig::new("http://localhost/parcels?id={id}");
        config.id_pattern = "([0-9".to_string();
        let result = HttpGeometryLookup::new(build_client(None).unwrap(), config);
        assert!(matches!(result, Err(LookupError::Pattern { .. })));
    }

    #[test]
    fn test_identifier_pattern_defaults_when_omitted() {
        let config: GeometryServiceConfig =
            serde_json::from_str(r#"{"url": "http://localhost/parcels?id={id}"}"#).unwrap();
        assert_eq!(config.id_pattern, DEFAULT_ID_PATTERN);
    }

    #[tokio::test]
    async fn test_geometry_lookup_configured_identifier_pattern() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/parcels.geojson")
            .match_query(Matcher::UrlEncoded("lot".into(), "12/34 A".into()))
            .with_status(200)
            .with_body(PARCEL_BODY)
            .expect(1)
            .create_async()
            .await;

        let mut config =
            GeometryServiceConfig::new(format!("{}/parcels.geojson?lot={{id}}", server.url()));
        config.id_pattern = r"^[0-9]+/[0-9]+ [A-Z]$".to_string();
        let lookup = HttpGeometryLookup::new(build_client(None).unwrap(), config).unwrap();

        let collection = lookup.parcel_geometry(&ParcelId::new("12/34 A")).await.unwrap();
        assert_eq!(collection.features.len(), 1);
        mock.assert_async().await;
    }

    #[test]
    fn test_render_template_encodes_values() {
        let url = render_template("http://x/search?text={text}", &[("{text}", "5 Main St & 2nd")]);
        assert_eq!(url, "http://x/search?text=5%20Main%20St%20%26%202nd");
    }

    #[test]
    fn test_value_at_path() {
        let value: JsonValue = serde_json::json!({"a": {"b": [{"c": 1}]}});
        assert_eq!(value_at_path(&value, "a.b.0.c"), Some(&JsonValue::from(1)));
        assert_eq!(value_at_path(&value, "a.x"), None);
    }
}
