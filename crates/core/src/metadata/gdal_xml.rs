//! GDAL_METADATA (TIFF tag 42112) parsing

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{PersistedMetadata, Scope};
use crate::error::{Error, Result};

/// Items of a `<GDALMetadata>` document.
///
/// Items carrying a `role` of `scale`, `offset` or `description` are band
/// properties rather than metadata and are split out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GdalMetadata {
    pub items: PersistedMetadata,
    /// 1-based band -> scale
    pub scales: BTreeMap<usize, f64>,
    pub offsets: BTreeMap<usize, f64>,
    pub descriptions: BTreeMap<usize, String>,
}

#[derive(Default)]
struct ItemAttrs {
    name: Option<String>,
    domain: String,
    sample: Option<usize>,
    role: Option<String>,
}

fn item_attrs(e: &BytesStart<'_>) -> Result<ItemAttrs> {
    let mut attrs = ItemAttrs::default();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::Format(format!("GDAL metadata: {}", e)))?;
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Format(format!("GDAL metadata: {}", e)))?
            .to_string();
        match attr.key.as_ref() {
            b"name" => attrs.name = Some(value),
            b"domain" => attrs.domain = value,
            b"role" => attrs.role = Some(value),
            b"sample" => {
                let sample = value.trim().parse().map_err(|_| {
                    Error::Format(format!("GDAL metadata: bad sample index '{}'", value))
                })?;
                attrs.sample = Some(sample);
            }
            _ => {}
        }
    }
    Ok(attrs)
}

/// Parse the XML stored in the `GDAL_METADATA` TIFF tag.
///
/// `sample` attributes are 0-based in the XML and become 1-based band
/// scopes. Items without a `name` are skipped.
pub fn parse_gdal_metadata(xml: &str) -> Result<GdalMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut meta = GdalMetadata::default();
    let mut current: Option<ItemAttrs> = None;
    let mut text = String::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::Format(format!("GDAL metadata: {}", e)))?
        {
            Event::Start(ref e) if e.name().as_ref() == b"Item" => {
                current = Some(item_attrs(e)?);
                text.clear();
            }
            Event::Empty(ref e) if e.name().as_ref() == b"Item" => {
                meta.add(item_attrs(e)?, "");
            }
            Event::Text(e) => {
                if current.is_some() {
                    let unescaped = e
                        .unescape()
                        .map_err(|e| Error::Format(format!("GDAL metadata: {}", e)))?;
                    text.push_str(&unescaped);
                }
            }
            Event::CData(e) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(ref e) if e.name().as_ref() == b"Item" => {
                if let Some(attrs) = current.take() {
                    meta.add(attrs, &text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(meta)
}

impl GdalMetadata {
    fn add(&mut self, attrs: ItemAttrs, value: &str) {
        let Some(name) = attrs.name else {
            return;
        };
        let band = attrs.sample.map(|s| s + 1);
        match (attrs.role.as_deref(), band) {
            (Some("scale"), Some(b)) => {
                if let Ok(v) = value.trim().parse() {
                    self.scales.insert(b, v);
                }
            }
            (Some("offset"), Some(b)) => {
                if let Ok(v) = value.trim().parse() {
                    self.offsets.insert(b, v);
                }
            }
            (Some("description"), Some(b)) => {
                self.descriptions.insert(b, value.to_string());
            }
            _ => {
                let scope = band.map_or(Scope::Dataset, Scope::Band);
                self.items.insert(&attrs.domain, scope, name, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ENVI_DOMAIN;

    const XML: &str = r#"<GDALMetadata>
  <Item name="sensor">EnMAP</Item>
  <Item name="wavelength" sample="0">450.5</Item>
  <Item name="wavelength_units" sample="0">Nanometers</Item>
  <Item name="wavelength" domain="ENVI">{450.5, 550.0}</Item>
  <Item name="SCALE" sample="1" role="scale">0.0001</Item>
  <Item name="OFFSET" sample="1" role="offset">-0.1</Item>
  <Item name="DESCRIPTION" sample="1" role="description">NIR &amp; more</Item>
  <Item name="empty" sample="1"/>
</GDALMetadata>"#;

    #[test]
    fn test_parse_items() {
        let meta = parse_gdal_metadata(XML).unwrap();
        let items = &meta.items;

        assert_eq!(items.get_raw("sensor", "", Scope::Dataset), Some("EnMAP"));
        assert_eq!(items.get_raw("wavelength", "", Scope::Band(1)), Some("450.5"));
        assert_eq!(
            items.get_raw("wavelength", ENVI_DOMAIN, Scope::Dataset),
            Some("{450.5, 550.0}")
        );
        assert_eq!(items.get_raw("empty", "", Scope::Band(2)), Some(""));
        assert_eq!(meta.scales.get(&2), Some(&0.0001));
        assert_eq!(meta.offsets.get(&2), Some(&-0.1));
        assert_eq!(meta.descriptions.get(&2).map(String::as_str), Some("NIR & more"));
        assert!(meta.scales.get(&1).is_none());
    }

    #[test]
    fn test_bad_sample_index() {
        let xml = r#"<GDALMetadata><Item name="x" sample="a">1</Item></GDALMetadata>"#;
        assert!(parse_gdal_metadata(xml).is_err());
    }
}
