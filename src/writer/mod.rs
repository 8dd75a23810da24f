use std::borrow::Cow;
use std::io::Write;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::Writer;

use crate::error::WriteError;
use crate::model::{
    Coordinates, Document, DocumentItem, Kml, Placemark, PointGeometry, RawAttribute, RawElement,
};

const INDENT_SIZE: usize = 2;

#[derive(Default)]
pub struct KmlWriter {}

impl KmlWriter {
    pub fn new() -> Self {
        Self {}
    }

    pub fn to_bytes(&self, kml: &Kml) -> Result<Vec<u8>, WriteError> {
        let mut bytes = Vec::new();
        self.write(kml, &mut bytes)?;
        Ok(bytes)
    }

    /// 整形して書き出す。子要素は保持している順
    pub fn write<W: Write>(&self, kml: &Kml, out: W) -> Result<(), WriteError> {
        let mut writer = Writer::new_with_indent(out, b' ', INDENT_SIZE);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let tag = qualified(&kml.prefix, "kml");
        writer.write_event(Event::Start(start_tag(&tag, &kml.attributes)))?;

        for raw in &kml.leading {
            write_raw(&mut writer, raw)?;
        }
        self.write_document(&mut writer, &kml.document)?;
        for raw in &kml.trailing {
            write_raw(&mut writer, raw)?;
        }

        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        Ok(())
    }

    fn write_document<W: Write>(
        &self,
        writer: &mut Writer<W>,
        document: &Document,
    ) -> Result<(), WriteError> {
        let tag = qualified(&document.prefix, "Document");
        writer.write_event(Event::Start(start_tag(&tag, &document.attributes)))?;

        for item in &document.items {
            match item {
                DocumentItem::Placemark(placemark) => self.write_placemark(writer, placemark)?,
                DocumentItem::Raw(raw) => write_raw(writer, raw)?,
            }
        }

        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        Ok(())
    }

    fn write_placemark<W: Write>(
        &self,
        writer: &mut Writer<W>,
        placemark: &Placemark,
    ) -> Result<(), WriteError> {
        let tag = qualified(&placemark.prefix, "Placemark");
        writer.write_event(Event::Start(start_tag(&tag, &placemark.attributes)))?;

        // KMLスキーマの順序: name → その他の要素 → ジオメトリ
        if let Some(name) = &placemark.name {
            write_text_element(writer, &qualified(&placemark.name_prefix, "name"), name)?;
        }
        for raw in &placemark.extra {
            write_raw(writer, raw)?;
        }
        if let Some(point) = &placemark.point {
            self.write_point(writer, point)?;
        }

        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        Ok(())
    }

    fn write_point<W: Write>(
        &self,
        writer: &mut Writer<W>,
        point: &PointGeometry,
    ) -> Result<(), WriteError> {
        let tag = qualified(&point.prefix, "Point");
        writer.write_event(Event::Start(start_tag(&tag, &point.attributes)))?;

        for raw in &point.extra {
            write_raw(writer, raw)?;
        }
        let coordinates_tag = qualified(&point.coordinates_prefix, "coordinates");
        match &point.coordinates {
            Some(Coordinates::Valid(position)) => write_text_element(
                writer,
                &coordinates_tag,
                &position.to_coordinates_text(),
            )?,
            Some(Coordinates::Invalid(text)) => {
                write_text_element(writer, &coordinates_tag, text)?
            }
            None => {}
        }

        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        Ok(())
    }
}

/// 接頭辞があれば `prefix:local`
fn qualified(prefix: &Option<String>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

/// 属性値は読み込み時のエスケープ済みの形で保持しているのでそのまま書く
fn start_tag<'a>(name: &'a str, attributes: &'a [RawAttribute]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for (key, value) in attributes {
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Borrowed(value.as_bytes()),
        });
    }
    start
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), WriteError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// 未解釈の要素は改行とインデントだけ付けて、中身は読み込んだ書式のまま書く
///
/// 直前に書いたのは常にタグなので、ここでの改行は `write_event` の整形と同じになる。
fn write_raw<W: Write>(writer: &mut Writer<W>, raw: &RawElement) -> Result<(), WriteError> {
    writer.write_indent()?;

    let mut verbatim = Writer::new(writer.get_mut());
    for event in &raw.events {
        verbatim.write_event(event.borrow())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use crate::parser::parse_kml;

    fn create_test_kml() -> Kml {
        let mut kml = Kml::default();
        kml.document
            .items
            .push(DocumentItem::Placemark(Placemark::new("A & B", 10.0, 20.5)));

        let mut with_alt = Placemark::new("C", -3.7038, 40.4168);
        with_alt.point.as_mut().unwrap().coordinates = Some(Coordinates::Valid(Position {
            longitude: -3.7038,
            latitude: 40.4168,
            altitude: Some("650.00".to_string()),
        }));
        kml.document.items.push(DocumentItem::Placemark(with_alt));
        kml
    }

    #[test]
    fn test_write_pretty_printed() {
        let bytes = KmlWriter::new().to_bytes(&create_test_kml()).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<kml xmlns=\"http://www.opengis.net/kml/2.2\">"));
        assert!(text.contains("\n  <Document>"));
        assert!(text.contains("<name>A &amp; B</name>"));
        assert!(text.contains("<coordinates>10,20.5</coordinates>"));
        assert!(text.contains("<coordinates>-3.7038,40.4168,650.00</coordinates>"));

        // 挿入順
        let a = text.find("A &amp; B").unwrap();
        let c = text.find("<name>C</name>").unwrap();
        assert!(a < c);
    }

    #[test]
    fn test_write_then_parse() {
        let kml = create_test_kml();
        let bytes = KmlWriter::new().to_bytes(&kml).unwrap();
        let parsed = parse_kml(bytes.as_slice()).unwrap();

        assert_eq!(parsed, kml);
    }

    #[test]
    fn test_mixed_content_written_unchanged() {
        let source = r#"<kml><Document>
            <Placemark>
              <name>P</name>
              <description>Hello <b>big</b> world</description>
              <ExtendedData><Data name="a">
                <value> spaced </value>
              </Data></ExtendedData>
            </Placemark>
        </Document></kml>"#;

        let kml = parse_kml(source.as_bytes()).unwrap();
        let text = String::from_utf8(KmlWriter::new().to_bytes(&kml).unwrap()).unwrap();

        assert!(text.contains("<description>Hello <b>big</b> world</description>"));
        assert!(text.contains(
            "<ExtendedData><Data name=\"a\">\n                <value> spaced </value>\n              </Data></ExtendedData>"
        ));

        // 2回目以降の保存でも変わらない
        let reparsed = parse_kml(text.as_bytes()).unwrap();
        assert_eq!(reparsed, kml);
        let again = String::from_utf8(KmlWriter::new().to_bytes(&reparsed).unwrap()).unwrap();
        assert_eq!(again, text);
    }

    #[test]
    fn test_prefixed_elements_keep_prefix() {
        let source = r#"<kml:kml xmlns:kml="http://www.opengis.net/kml/2.2">
          <kml:Document>
            <kml:Placemark>
              <kml:name>P</kml:name>
              <kml:Point><kml:coordinates>1,2</kml:coordinates></kml:Point>
            </kml:Placemark>
          </kml:Document>
        </kml:kml>"#;

        let kml = parse_kml(source.as_bytes()).unwrap();
        let text = String::from_utf8(KmlWriter::new().to_bytes(&kml).unwrap()).unwrap();

        assert!(text.contains("<kml:kml xmlns:kml=\"http://www.opengis.net/kml/2.2\">"));
        assert!(text.contains("\n  <kml:Document>"));
        assert!(text.contains("\n    <kml:Placemark>"));
        assert!(text.contains("<kml:name>P</kml:name>"));
        assert!(text.contains("<kml:Point>"));
        assert!(text.contains("<kml:coordinates>1,2</kml:coordinates>"));
        assert!(text.trim_end().ends_with("</kml:kml>"));
        assert!(!text.contains("<Placemark>"));
    }

    #[test]
    fn test_passthrough_survives_rewrite() {
        let source = r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">
          <Document id="d1">
            <name>Trip</name>
            <Style id="red"><IconStyle><color>ff0000ff</color></IconStyle></Style>
            <Placemark>
              <name>P1</name>
              <styleUrl>#red</styleUrl>
              <Point><altitudeMode>absolute</altitudeMode><coordinates>1,2,3</coordinates></Point>
            </Placemark>
          </Document>
        </kml>"#;

        let kml = parse_kml(source.as_bytes()).unwrap();
        let text = String::from_utf8(KmlWriter::new().to_bytes(&kml).unwrap()).unwrap();

        assert!(text.contains("xmlns:gx=\"http://www.google.com/kml/ext/2.2\""));
        assert!(text.contains("<Document id=\"d1\">"));
        assert!(text.contains("<Style id=\"red\">"));
        assert!(text.contains("<styleUrl>#red</styleUrl>"));
        assert!(text.contains("<altitudeMode>absolute</altitudeMode>"));

        let reparsed = parse_kml(text.as_bytes()).unwrap();
        assert_eq!(reparsed, kml);
    }
}
