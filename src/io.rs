use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::join_all;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::canvas::{Document, Layer, MAX_CANVAS_DIM, Offscreen};
use crate::error::DocumentError;
use crate::geometry::Color;

/// Version written by [`serialize`]; newer documents are rejected.
pub const FORMAT_VERSION: f64 = 1.0;

/// Maximum number of layers accepted from a persisted document.
const MAX_LAYERS: usize = 256;

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

// ============================================================================
// PERSISTED DOCUMENT FORMAT
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentFile<'a> {
    version: f64,
    title: &'a str,
    width: u32,
    height: u32,
    background_color: Color,
    layers: Vec<LayerFile>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LayerFile {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    opacity: f32,
    is_visible: bool,
    data: String,
}

/// Incoming document. Every field is optional so missing ones can be
/// reported by name or defaulted.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawDocument {
    version: Option<f64>,
    title: Option<String>,
    width: Option<f64>,
    height: Option<f64>,
    background_color: Option<RawColor>,
    layers: Option<Vec<RawLayer>>,
}

#[derive(Deserialize)]
struct RawColor {
    r: u8,
    g: u8,
    b: u8,
    #[serde(default = "opaque")]
    a: f32,
}

fn opaque() -> f32 {
    1.0
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawLayer {
    x: Option<f64>,
    y: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
    opacity: Option<f64>,
    is_visible: Option<bool>,
    data: Option<String>,
}

/// Encode a document to its persisted JSON form.
pub fn serialize(doc: &Document) -> Result<String, DocumentError> {
    let layers = doc
        .layers()
        .iter()
        .map(|layer| {
            Ok(LayerFile {
                x: 0,
                y: 0,
                width: layer.surface.width(),
                height: layer.surface.height(),
                opacity: layer.opacity(),
                is_visible: layer.is_visible(),
                data: png_data_uri(layer.surface.image())?,
            })
        })
        .collect::<Result<Vec<_>, DocumentError>>()?;

    let file = DocumentFile {
        version: FORMAT_VERSION,
        title: &doc.title,
        width: doc.width(),
        height: doc.height(),
        background_color: doc.background(),
        layers,
    };
    Ok(serde_json::to_string(&file)?)
}

/// Decode and validate a persisted document.
///
/// Each layer's image is decoded as its own future. Any failure rejects the
/// whole document with an error naming the offending field or layer.
pub async fn deserialize(data: &str) -> Result<Document, DocumentError> {
    let raw: RawDocument = serde_json::from_str(data)?;

    let version = raw.version.unwrap_or(FORMAT_VERSION);
    if !version.is_finite() || version > FORMAT_VERSION {
        return Err(DocumentError::UnsupportedVersion(version));
    }

    let width = dimension("width", raw.width.ok_or(DocumentError::MissingField("width"))?)?;
    let height = dimension("height", raw.height.ok_or(DocumentError::MissingField("height"))?)?;
    let background = raw
        .background_color
        .map(|c| Color::rgba(c.r, c.g, c.b, c.a))
        .unwrap_or(Color::WHITE);

    let raw_layers = raw.layers.ok_or(DocumentError::MissingField("layers"))?;
    if raw_layers.is_empty() {
        return Err(DocumentError::InvalidField {
            field: "layers",
            reason: "a document needs at least one layer".into(),
        });
    }
    if raw_layers.len() > MAX_LAYERS {
        return Err(DocumentError::InvalidField {
            field: "layers",
            reason: format!("{} layers exceeds the limit of {}", raw_layers.len(), MAX_LAYERS),
        });
    }

    let decoded = join_all(
        raw_layers
            .into_iter()
            .enumerate()
            .map(|(index, raw)| decode_layer(index, raw, width, height)),
    )
    .await;
    let layers = decoded.into_iter().collect::<Result<Vec<_>, _>>()?;

    let title = raw.title.unwrap_or_default();
    tracing::debug!(width, height, layers = layers.len(), "document deserialized");
    Document::from_parts(title, width, height, background, layers).map_err(|e| DocumentError::InvalidField {
        field: "layers",
        reason: e.to_string(),
    })
}

fn dimension(field: &'static str, value: f64) -> Result<u32, DocumentError> {
    if !value.is_finite() || value.fract() != 0.0 || value < 1.0 || value > MAX_CANVAS_DIM as f64 {
        return Err(DocumentError::InvalidField {
            field,
            reason: format!("{} is not an integer in 1..={}", value, MAX_CANVAS_DIM),
        });
    }
    Ok(value as u32)
}

async fn decode_layer(index: usize, raw: RawLayer, width: u32, height: u32) -> Result<Layer, DocumentError> {
    let data = raw.data.ok_or(DocumentError::MissingField("layers[].data"))?;
    let image = decode_data_uri(&data).map_err(|reason| DocumentError::LayerImage { index, reason })?;

    let mut surface = Offscreen::new(width, height);
    let x = raw.x.filter(|v| v.is_finite()).unwrap_or(0.0) as i64;
    let y = raw.y.filter(|v| v.is_finite()).unwrap_or(0.0) as i64;
    surface.put_region(&Offscreen::from_image(image), x, y);

    if let (Some(w), Some(h)) = (raw.width, raw.height)
        && (w as u32, h as u32) != (width, height)
    {
        tracing::warn!(index, w, h, width, height, "layer size differs from document, clipping");
    }

    let mut layer = Layer::from_surface(surface);
    layer.set_opacity(raw.opacity.filter(|v| v.is_finite()).unwrap_or(1.0) as f32);
    layer.set_visible(raw.is_visible.unwrap_or(true));
    Ok(layer)
}

/// Decode a `data:<mime>;base64,<payload>` image URI to RGBA.
fn decode_data_uri(uri: &str) -> Result<RgbaImage, String> {
    let payload = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, payload)| payload)
        .ok_or_else(|| "not a base64 data URI".to_string())?;
    let bytes = STANDARD.decode(payload).map_err(|e| e.to_string())?;
    let (w, h) = image::io::Reader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .into_dimensions()
        .map_err(|e| e.to_string())?;
    if w > MAX_CANVAS_DIM || h > MAX_CANVAS_DIM {
        return Err(format!("{}x{} image exceeds the {} pixel limit", w, h, MAX_CANVAS_DIM));
    }
    let img = image::load_from_memory(&bytes).map_err(|e| e.to_string())?;
    Ok(img.into_rgba8())
}

// ============================================================================
// EXPORT
// ============================================================================

/// PNG-encode an RGBA image.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, DocumentError> {
    let mut bytes = Vec::new();
    let encoder = PngEncoder::new(Cursor::new(&mut bytes));
    encoder.write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)?;
    Ok(bytes)
}

fn png_data_uri(image: &RgbaImage) -> Result<String, DocumentError> {
    let bytes = encode_png(image)?;
    Ok(format!("{}{}", PNG_DATA_URI_PREFIX, STANDARD.encode(bytes)))
}

/// Flattened document (background included) as PNG bytes.
pub fn export_png(doc: &Document) -> Result<Vec<u8>, DocumentError> {
    encode_png(doc.composite().image())
}

/// Flattened document as a PNG data URI, the form handed to clipboards.
pub fn copy_png_data_uri(doc: &Document) -> Result<String, DocumentError> {
    png_data_uri(doc.composite().image())
}

/// Write the flattened document to `path` as PNG.
pub fn save_png(doc: &Document, path: &std::path::Path) -> Result<(), DocumentError> {
    std::fs::write(path, export_png(doc)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use pollster::block_on;

    fn sample_doc() -> Document {
        let mut doc = Document::new(6, 4).unwrap();
        doc.title = "sketch".into();
        doc.layer_mut(0).unwrap().surface.put_pixel(1, 2, Rgba([9, 8, 7, 255]));
        doc.insert_layer(1, Layer::new(6, 4));
        doc.set_layer_opacity(1, 0.25);
        doc.set_layer_visible(1, false);
        doc
    }

    #[test]
    fn serialized_shape_matches_format() {
        let json: serde_json::Value = serde_json::from_str(&serialize(&sample_doc()).unwrap()).unwrap();
        assert_eq!(json["version"], 1.0);
        assert_eq!(json["title"], "sketch");
        assert_eq!(json["backgroundColor"]["r"], 255);
        let layer = &json["layers"][1];
        assert_eq!(layer["x"], 0);
        assert_eq!(layer["isVisible"], false);
        assert!(layer["data"].as_str().unwrap().starts_with(PNG_DATA_URI_PREFIX));
    }

    #[test]
    fn deserialize_restores_pixels_and_properties() {
        let doc = sample_doc();
        let loaded = block_on(deserialize(&serialize(&doc).unwrap())).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (6, 4));
        assert_eq!(loaded.layers()[0].surface, doc.layers()[0].surface);
        assert_eq!(loaded.layers()[1].opacity(), 0.25);
        assert!(!loaded.layers()[1].is_visible());
    }

    #[test]
    fn missing_fields_are_named() {
        let err = block_on(deserialize(r#"{"height": 4, "layers": []}"#)).unwrap_err();
        assert!(matches!(err, DocumentError::MissingField("width")));
        let err = block_on(deserialize(r#"{"width": 4, "height": 4}"#)).unwrap_err();
        assert!(matches!(err, DocumentError::MissingField("layers")));
    }

    #[test]
    fn wrong_types_and_bad_values_are_rejected() {
        assert!(matches!(
            block_on(deserialize(r#"{"width": "wide", "height": 4, "layers": []}"#)),
            Err(DocumentError::Json(_))
        ));
        assert!(matches!(
            block_on(deserialize(r#"{"width": -3, "height": 4, "layers": []}"#)),
            Err(DocumentError::InvalidField { field: "width", .. })
        ));
        assert!(matches!(
            block_on(deserialize(r#"{"version": 9, "width": 3, "height": 4, "layers": []}"#)),
            Err(DocumentError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn bad_layer_blob_reports_layer_index() {
        let json = r#"{"width": 2, "height": 2, "layers": [{"data": "data:image/png;base64,AAAA"}]}"#;
        let err = block_on(deserialize(json)).unwrap_err();
        assert!(matches!(err, DocumentError::LayerImage { index: 0, .. }));
    }

    #[test]
    fn optional_fields_fall_back_to_defaults() {
        let blob = png_data_uri(&RgbaImage::new(2, 2)).unwrap();
        let json = format!(r#"{{"width": 2, "height": 2, "layers": [{{"data": "{}"}}]}}"#, blob);
        let doc = block_on(deserialize(&json)).unwrap();
        assert_eq!(doc.background(), Color::WHITE);
        assert_eq!(doc.title, "");
        assert_eq!(doc.layers()[0].opacity(), 1.0);
        assert!(doc.layers()[0].is_visible());
    }

    #[test]
    fn export_is_flattened_png() {
        let bytes = export_png(&sample_doc()).unwrap();
        let img = image::load_from_memory(&bytes).unwrap().into_rgba8();
        assert_eq!(img.dimensions(), (6, 4));
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert!(copy_png_data_uri(&sample_doc()).unwrap().starts_with(PNG_DATA_URI_PREFIX));
    }

    #[test]
    fn oversized_layer_blob_is_rejected_before_decoding() {
        let blob = png_data_uri(&RgbaImage::new(MAX_CANVAS_DIM + 1, 1)).unwrap();
        let json = format!(r#"{{"width": 2, "height": 2, "layers": [{{"data": "{}"}}]}}"#, blob);
        match block_on(deserialize(&json)) {
            Err(DocumentError::LayerImage { index: 0, reason }) => assert!(reason.contains("exceeds")),
            other => panic!("expected a layer error, got {:?}", other.map(|d| d.width())),
        }
    }
}
