//! Remote imagery service.
//!
//! [`ImageryService`] is the seam between the worker and the network.
//! [`EarthEngineClient`] implements it on the Earth Engine REST API: one
//! `image:computePixels` call per tile, returning a GeoTIFF of the
//! date-filtered, band-selected, clipped and unmasked collection mosaic.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use wwtp_source::{SourceError, retry};

use crate::config::{AcquisitionConfig, DateRange, EarthEngineCredentials};
use crate::tile::TileBounds;

/// A failed tile export. Recovered per point by the worker.
#[derive(Debug, thiserror::Error)]
pub enum ImageryError {
    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// The request failed after retries or was rejected.
    #[error("Export request failed: {0}")]
    Request(#[from] SourceError),

    /// The tile could not be written.
    #[error("I/O error writing tile: {0}")]
    Io(#[from] std::io::Error),

    /// The service answered with something that is not a tile.
    #[error("Invalid export response: {message}")]
    InvalidResponse {
        /// What was wrong with the response.
        message: String,
    },
}

/// Everything needed to export one tile.
#[derive(Debug, Clone, Copy)]
pub struct ExportRequest<'a> {
    /// Imagery collection to mosaic.
    pub collection_id: &'a str,
    /// Acquisition window.
    pub date_range: DateRange,
    /// Bands to keep.
    pub bands: &'a [String],
    /// Area to clip to.
    pub bounds: TileBounds,
    /// Ground size of one pixel, in metres.
    pub scale_m: f64,
    /// File the GeoTIFF is written to.
    pub output_path: &'a Path,
}

/// Exports one imagery tile to disk.
#[async_trait]
pub trait ImageryService: Send + Sync {
    /// Writes the tile described by `request` to `request.output_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageryError`] if the tile could not be produced or
    /// written.
    async fn export_tile(&self, request: &ExportRequest<'_>) -> Result<(), ImageryError>;
}

/// Earth Engine REST client.
pub struct EarthEngineClient {
    client: reqwest::Client,
    base_url: String,
    credentials: EarthEngineCredentials,
    max_retries: u32,
}

impl EarthEngineClient {
    /// Builds a client with the configured endpoint, timeout and retries.
    ///
    /// # Errors
    ///
    /// Returns [`ImageryError::Client`] if the HTTP client cannot be built.
    pub fn new(
        config: &AcquisitionConfig,
        credentials: EarthEngineCredentials,
    ) -> Result<Self, ImageryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            credentials,
            max_retries: config.max_retries,
        })
    }

    /// `{base}/projects/{project}/image:computePixels`.
    #[must_use]
    pub fn compute_pixels_url(&self) -> String {
        format!(
            "{}/projects/{}/image:computePixels",
            self.base_url, self.credentials.project
        )
    }
}

#[async_trait]
impl ImageryService for EarthEngineClient {
    async fn export_tile(&self, request: &ExportRequest<'_>) -> Result<(), ImageryError> {
        let url = self.compute_pixels_url();
        let body = compute_pixels_body(request);

        let bytes = retry::send_bytes(
            || {
                self.client
                    .post(&url)
                    .bearer_auth(&self.credentials.access_token)
                    .json(&body)
            },
            self.max_retries,
        )
        .await?;

        if !is_geotiff(&bytes) {
            return Err(ImageryError::InvalidResponse {
                message: format!("expected a GeoTIFF, got {} bytes", bytes.len()),
            });
        }

        tokio::fs::write(request.output_path, &bytes).await?;
        Ok(())
    }
}

/// TIFF magic in either byte order, classic or BigTIFF.
fn is_geotiff(bytes: &[u8]) -> bool {
    matches!(
        bytes.get(..4),
        Some([b'I', b'I', 42 | 43, 0] | [b'M', b'M', 0, 42 | 43])
    )
}

fn invoke(function_name: &str, arguments: Value) -> Value {
    json!({
        "functionInvocationValue": {
            "functionName": function_name,
            "arguments": arguments,
        }
    })
}

fn constant(value: impl Into<Value>) -> Value {
    json!({ "constantValue": value.into() })
}

/// Builds the `computePixels` request body for one tile.
///
/// Expression: `ImageCollection.load` → `Collection.filter` (date range) →
/// `ImageCollection.mosaic` → `Image.select` → `Image.clip` →
/// `Image.unmask`, rendered on an EPSG:4326 grid anchored at the
/// north-west corner.
#[must_use]
pub fn compute_pixels_body(request: &ExportRequest<'_>) -> Value {
    let bounds = request.bounds;
    let grid = bounds.pixel_grid(request.scale_m);

    let collection = invoke(
        "ImageCollection.load",
        json!({ "id": constant(request.collection_id) }),
    );
    let date_filter = invoke(
        "Filter.dateRangeContains",
        json!({
            "leftValue": invoke(
                "DateRange",
                json!({
                    "start": constant(request.date_range.start.to_string()),
                    "end": constant(request.date_range.end.to_string()),
                }),
            ),
            "rightField": constant("system:time_start"),
        }),
    );
    let filtered = invoke(
        "Collection.filter",
        json!({ "collection": collection, "filter": date_filter }),
    );
    let mosaic = invoke("ImageCollection.mosaic", json!({ "collection": filtered }));
    let selected = invoke(
        "Image.select",
        json!({ "input": mosaic, "bandSelectors": constant(request.bands.to_vec()) }),
    );
    let clipped = invoke(
        "Image.clip",
        json!({
            "input": selected,
            "geometry": invoke(
                "GeometryConstructors.Polygon",
                json!({
                    "coordinates": constant(json!([[
                        [bounds.west, bounds.south],
                        [bounds.east, bounds.south],
                        [bounds.east, bounds.north],
                        [bounds.west, bounds.north],
                        [bounds.west, bounds.south],
                    ]])),
                    "geodesic": constant(false),
                }),
            ),
        }),
    );
    let unmasked = invoke("Image.unmask", json!({ "input": clipped, "value": constant(0) }));

    json!({
        "expression": {
            "result": "0",
            "values": { "0": unmasked },
        },
        "fileFormat": "GEO_TIFF",
        "bandIds": request.bands,
        "grid": {
            "dimensions": { "width": grid.width, "height": grid.height },
            "affineTransform": {
                "scaleX": grid.scale_x,
                "shearX": 0.0,
                "translateX": bounds.west,
                "shearY": 0.0,
                "scaleY": -grid.scale_y,
                "translateY": bounds.north,
            },
            "crsCode": "EPSG:4326",
        },
    })
}
