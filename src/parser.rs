use std::io::BufRead;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::error::ParseError;
use crate::model::{
    Coordinates, Document, DocumentItem, Kml, Placemark, PointGeometry, RawAttribute, RawElement,
};

/// KML文書を読む
///
/// 要素はローカル名で判定するので `<Placemark>` も `<kml:Placemark>` も読める。
/// 接頭辞は書き戻し用に残す。モデルにない要素は [`RawElement`] として元の位置に残す。
pub fn parse_kml<R: BufRead>(reader: R) -> Result<Kml, ParseError> {
    KmlParser::new(reader).parse()
}

struct KmlParser<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> KmlParser<R> {
    fn new(reader: R) -> Self {
        // 未解釈の要素は空白も含めてそのまま残すので trim_text は使わない
        let reader = Reader::from_reader(reader);
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    fn next_event(&mut self) -> Result<Event<'static>, ParseError> {
        self.buf.clear();
        let event = self.reader.read_event_into(&mut self.buf)?;
        Ok(event.into_owned())
    }

    fn parse(mut self) -> Result<Kml, ParseError> {
        // XML宣言やコメントを読み飛ばしてルート要素を探す
        loop {
            match self.next_event()? {
                Event::Start(start) => {
                    let attributes = root_attributes(&start)?;
                    return self.parse_root(prefix(&start), attributes);
                }
                Event::Empty(start) => {
                    let attributes = root_attributes(&start)?;
                    return Ok(Kml {
                        prefix: prefix(&start),
                        attributes,
                        leading: Vec::new(),
                        document: Document::default(),
                        trailing: Vec::new(),
                    });
                }
                Event::Eof => return Err(ParseError::MissingRoot),
                _ => {}
            }
        }
    }

    fn parse_root(
        &mut self,
        root_prefix: Option<String>,
        attributes: Vec<RawAttribute>,
    ) -> Result<Kml, ParseError> {
        let mut leading = Vec::new();
        let mut trailing = Vec::new();
        let mut document: Option<Document> = None;

        loop {
            let event = self.next_event()?;
            match event {
                Event::Start(ref start) if document.is_none() && is(start, "Document") => {
                    let attrs = raw_attributes(start)?;
                    document = Some(self.parse_document(prefix(start), attrs)?);
                }
                Event::Empty(ref start) if document.is_none() && is(start, "Document") => {
                    document = Some(Document {
                        prefix: prefix(start),
                        attributes: raw_attributes(start)?,
                        items: Vec::new(),
                    });
                }
                Event::Text(ref text) if is_blank(text) => {}
                Event::End(_) => break,
                Event::Eof => return Err(ParseError::UnexpectedEof("kml".to_string())),
                other => {
                    let raw = self.capture(other)?;
                    if document.is_none() {
                        leading.push(raw);
                    } else {
                        trailing.push(raw);
                    }
                }
            }
        }

        Ok(Kml {
            prefix: root_prefix,
            attributes,
            leading,
            document: document.unwrap_or_default(),
            trailing,
        })
    }

    fn parse_document(
        &mut self,
        document_prefix: Option<String>,
        attributes: Vec<RawAttribute>,
    ) -> Result<Document, ParseError> {
        let mut items = Vec::new();

        loop {
            let event = self.next_event()?;
            match event {
                Event::Start(ref start) if is(start, "Placemark") => {
                    let attrs = raw_attributes(start)?;
                    items.push(DocumentItem::Placemark(
                        self.parse_placemark(prefix(start), attrs)?,
                    ));
                }
                Event::Empty(ref start) if is(start, "Placemark") => {
                    items.push(DocumentItem::Placemark(Placemark {
                        prefix: prefix(start),
                        attributes: raw_attributes(start)?,
                        ..Default::default()
                    }));
                }
                Event::Text(ref text) if is_blank(text) => {}
                Event::End(_) => break,
                Event::Eof => return Err(ParseError::UnexpectedEof("Document".to_string())),
                other => items.push(DocumentItem::Raw(self.capture(other)?)),
            }
        }

        debug!("Parsed <Document> with {} items", items.len());
        Ok(Document {
            prefix: document_prefix,
            attributes,
            items,
        })
    }

    fn parse_placemark(
        &mut self,
        placemark_prefix: Option<String>,
        attributes: Vec<RawAttribute>,
    ) -> Result<Placemark, ParseError> {
        let mut placemark = Placemark {
            prefix: placemark_prefix,
            attributes,
            ..Default::default()
        };

        loop {
            let event = self.next_event()?;
            match event {
                Event::Start(ref start) if placemark.name.is_none() && is(start, "name") => {
                    placemark.name_prefix = prefix(start);
                    placemark.name = Some(self.read_text("name")?);
                }
                Event::Empty(ref start) if placemark.name.is_none() && is(start, "name") => {
                    placemark.name_prefix = prefix(start);
                    placemark.name = Some(String::new());
                }
                Event::Start(ref start) if placemark.point.is_none() && is(start, "Point") => {
                    let attrs = raw_attributes(start)?;
                    placemark.point = Some(self.parse_point(prefix(start), attrs)?);
                }
                Event::Empty(ref start) if placemark.point.is_none() && is(start, "Point") => {
                    placemark.point = Some(PointGeometry {
                        prefix: prefix(start),
                        attributes: raw_attributes(start)?,
                        ..Default::default()
                    });
                }
                Event::Text(ref text) if is_blank(text) => {}
                Event::End(_) => break,
                Event::Eof => return Err(ParseError::UnexpectedEof("Placemark".to_string())),
                other => placemark.extra.push(self.capture(other)?),
            }
        }

        Ok(placemark)
    }

    fn parse_point(
        &mut self,
        point_prefix: Option<String>,
        attributes: Vec<RawAttribute>,
    ) -> Result<PointGeometry, ParseError> {
        let mut point = PointGeometry {
            prefix: point_prefix,
            attributes,
            ..Default::default()
        };

        loop {
            let event = self.next_event()?;
            match event {
                Event::Start(ref start) if point.coordinates.is_none() && is(start, "coordinates") => {
                    point.coordinates_prefix = prefix(start);
                    let text = self.read_text("coordinates")?;
                    point.coordinates = Some(Coordinates::from_text(&text));
                }
                Event::Empty(ref start) if point.coordinates.is_none() && is(start, "coordinates") => {
                    point.coordinates_prefix = prefix(start);
                    point.coordinates = Some(Coordinates::Invalid(String::new()));
                }
                Event::Text(ref text) if is_blank(text) => {}
                Event::End(_) => break,
                Event::Eof => return Err(ParseError::UnexpectedEof("Point".to_string())),
                other => point.extra.push(self.capture(other)?),
            }
        }

        Ok(point)
    }

    /// 要素のテキスト（CDATA含む）を終了タグまで読む
    fn read_text(&mut self, element: &str) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Text(t) => text.push_str(&t.unescape()?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
                Event::End(_) => return Ok(text.trim().to_string()),
                Event::Start(found) | Event::Empty(found) => {
                    return Err(ParseError::UnexpectedElement {
                        parent: element.to_string(),
                        found: local_name(&found),
                    })
                }
                Event::Eof => return Err(ParseError::UnexpectedEof(element.to_string())),
                _ => {}
            }
        }
    }

    /// 未解釈のイベントを集める。開始タグなら部分木全体
    fn capture(&mut self, first: Event<'static>) -> Result<RawElement, ParseError> {
        let open = match &first {
            Event::Start(start) => Some(local_name(start)),
            _ => None,
        };
        let mut events = vec![first];

        if let Some(name) = open {
            let mut depth = 1usize;
            let mut nested_placemarks = 0usize;
            while depth > 0 {
                let event = self.next_event()?;
                match &event {
                    Event::Start(start) => {
                        depth += 1;
                        if is(start, "Placemark") {
                            nested_placemarks += 1;
                        }
                    }
                    Event::Empty(start) if is(start, "Placemark") => nested_placemarks += 1,
                    Event::End(_) => depth -= 1,
                    Event::Eof => return Err(ParseError::UnexpectedEof(name)),
                    _ => {}
                }
                events.push(event);
            }
            debug!("Kept unrecognized element <{}> ({} events)", name, events.len());
            if nested_placemarks > 0 {
                debug!(
                    "<{}> holds {} placemarks; they are saved unchanged but not listed or edited",
                    name, nested_placemarks
                );
            }
        }

        Ok(RawElement::new(events))
    }
}

fn is(start: &BytesStart, name: &str) -> bool {
    start.local_name().as_ref() == name.as_bytes()
}

/// 元の名前空間接頭辞 (`kml:Placemark` なら `kml`)
fn prefix(start: &BytesStart) -> Option<String> {
    start
        .name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

/// 構造要素の間にある整形用の空白
fn is_blank(text: &BytesText) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

fn local_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn root_attributes(start: &BytesStart) -> Result<Vec<RawAttribute>, ParseError> {
    if !is(start, "kml") {
        return Err(ParseError::UnexpectedRoot(local_name(start)));
    }
    raw_attributes(start)
}

fn raw_attributes(start: &BytesStart) -> Result<Vec<RawAttribute>, ParseError> {
    start
        .attributes()
        .map(|attr| {
            let attr = attr?;
            Ok((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                String::from_utf8_lossy(&attr.value).into_owned(),
            ))
        })
        .collect()
}
