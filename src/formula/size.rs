// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::io::{Cursor, Read};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::events::{BytesStart, Event};

use super::{pipeline::OutputFormat, FormulaError};

/// Pixels per point in the SVG output of `pdf2svg` and `dvisvgm`.
const PT_TO_PX: f64 = 1.777778;

/// `(width, height)` in pixels of an image in `format`.
pub fn image_size(data: &[u8], format: OutputFormat) -> Result<(u32, u32), FormulaError> {
    match format {
        OutputFormat::Png => image::ImageReader::with_format(Cursor::new(data), image::ImageFormat::Png)
            .into_dimensions()
            .map_err(|e| FormulaError::ImageSize(e.to_string())),
        OutputFormat::Svg => svg_size(data),
        OutputFormat::Svgz => {
            let mut svg = Vec::new();
            flate2::read::GzDecoder::new(data).read_to_end(&mut svg)?;
            svg_size(&svg)
        }
    }
}

fn svg_size(data: &[u8]) -> Result<(u32, u32), FormulaError> {
    let mut reader = quick_xml::Reader::from_reader(data);
    let mut buffer = Vec::new();
    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(root)) | Ok(Event::Empty(root)) => {
                return Ok((svg_length(&root, "width")?, svg_length(&root, "height")?));
            }
            Ok(Event::Eof) => return Err(FormulaError::ImageSize("SVG document has no root element!".into())),
            Err(e) => return Err(FormulaError::ImageSize(e.to_string())),
            _ => {}
        }
        buffer.clear();
    }
}

fn svg_length(root: &BytesStart, name: &str) -> Result<u32, FormulaError> {
    let value = root
        .try_get_attribute(name)
        .map_err(|e| FormulaError::ImageSize(e.to_string()))?
        .map(|attribute| String::from_utf8_lossy(&attribute.value).into_owned())
        .ok_or_else(|| FormulaError::ImageSize(format!("SVG root has no {} attribute!", name)))?;
    parse_svg_unit(&value)
}

/// Converts an SVG length to pixels. Only `pt` occurs in converter output.
pub fn parse_svg_unit(length: &str) -> Result<u32, FormulaError> {
    let invalid = || FormulaError::ImageSize(format!("Cannot interpret SVG unit \"{}\"!", length));
    let value: f64 = length
        .strip_suffix("pt")
        .ok_or_else(invalid)?
        .trim()
        .parse()
        .map_err(|_| invalid())?;
    Ok((value * PT_TO_PX).round() as u32)
}

pub fn data_uri(data: &[u8], format: OutputFormat) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(data))
}
