//! Decoding and encoding of a single SPM tile: the mixed text-header /
//! binary-raster container described by `examples/original_source/spm_process`.
//!
//! A tile is one image channel out of possibly several stored in one file.
//! Reading is a two-pass affair (text scan for the header, then a binary
//! seek-and-read for the raster) mirroring `spm_reader.hpp`'s `SpmReader`;
//! writing streams a template file line by line, splicing in a handful of
//! changed fields, the way `spm_stitching.hpp`'s `buildOutputSpmHeader` does.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write as IoWrite};
use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};
use crate::header;
use crate::io as spm_io;

const CIAO_IMAGE_LIST: &str = "\\*Ciao image list";
const FILE_LIST_END: &str = "\\*File list end";

const IMAGE_LABEL_PATTERN: &str = r#"\\@2:Image Data: S \[.*?\] "(.*?)""#;
const Z_SCALE_PATTERN: &str = r"\\@2:Z scale: V \[(.*?)\] \(.*?\) (\d+(?:\.\d+)?) (\S+)";
// Same line as Z_SCALE_PATTERN, but with a single capture group around the
// value only, for use with the generic `header::replace_double`.
const Z_SCALE_VALUE_PATTERN: &str = r"\\@2:Z scale: V \[.*?\] \(.*?\) (\d+(?:\.\d+)?) \S+";

const DATA_LENGTH_PATTERN: &str = r"\\Data length: (\d+)";
const DATA_OFFSET_PATTERN: &str = r"\\Data offset: (\d+)";
const BYTES_PER_PIXEL_PATTERN: &str = r"\\Bytes/pixel: ([24])";
const FRAME_DIRECTION_PATTERN: &str = r"\\Frame direction: ([A-Za-z]+)";
const CAPTURE_START_LINE_PATTERN: &str = r"\\Capture start line: (\d+)";
const COLOR_TABLE_INDEX_PATTERN: &str = r"\\Color Table Index: (\d+)";
const RELATIVE_FRAME_TIME_PATTERN: &str = r"\\Relative frame time: (\d+(?:\.\d+)?)";
const SAMPS_PER_LINE_PATTERN: &str = r"\\Samps/line: (\d+)";
const NUMBER_OF_LINES_PATTERN: &str = r"\\Number of lines: (\d+)";

const SCAN_SIZE_PATTERN: &str = r"\\Scan Size: (\d+(?:\.\d+)?) nm";
const ENGAGE_X_PATTERN: &str = r"\\Engage X Pos: ([0-9.-]+) ([a-zA-Z]+)";
const ENGAGE_Y_PATTERN: &str = r"\\Engage Y Pos: ([0-9.-]+) ([a-zA-Z]+)";
const X_OFFSET_PATTERN: &str = r"\\X Offset: ([0-9.-]+) ([a-zA-Z]+)";
const Y_OFFSET_PATTERN: &str = r"\\Y Offset: ([0-9.-]+) ([a-zA-Z]+)";


/// On-disk pixel width, the only two widths the format defines.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RawWidth {
    Sixteen,
    ThirtyTwo,
}

impl RawWidth {
    pub fn from_bytes_per_pixel(bytes_per_pixel: u32) -> Result<Self> {
        match bytes_per_pixel {
            2 => Ok(RawWidth::Sixteen),
            4 => Ok(RawWidth::ThirtyTwo),
            other => Err(Error::unsupported_pixel_width(other)),
        }
    }

    pub fn bytes(self) -> u32 {
        match self {
            RawWidth::Sixteen => 2,
            RawWidth::ThirtyTwo => 4,
        }
    }

    /// `2^(8 * bytes) - 1`, the largest unsigned value representable at this width.
    pub fn max_raw(self) -> f64 {
        match self {
            RawWidth::Sixteen => u16::MAX as f64,
            RawWidth::ThirtyTwo => u32::MAX as f64,
        }
    }

    /// `2^(8 * bytes)`, the divisor used throughout the raw/real conversion.
    pub fn scale_divisor(self) -> f64 {
        2_f64.powi(8 * self.bytes() as i32)
    }
}


/// Fields shared by every image channel in a file: the "Head" section.
#[derive(Debug, Clone)]
pub struct HeadFields {
    pub scan_size_nm: i64,
    pub engage_x_nm: f64,
    pub engage_y_nm: f64,
    pub x_offset_nm: f64,
    pub y_offset_nm: f64,
}

impl HeadFields {
    fn parse(head_text: &str) -> Self {
        HeadFields {
            scan_size_nm: header::get_int(head_text, SCAN_SIZE_PATTERN),
            engage_x_nm: header::get_value_with_unit(head_text, ENGAGE_X_PATTERN),
            engage_y_nm: header::get_value_with_unit(head_text, ENGAGE_Y_PATTERN),
            x_offset_nm: header::get_value_with_unit(head_text, X_OFFSET_PATTERN),
            y_offset_nm: header::get_value_with_unit(head_text, Y_OFFSET_PATTERN),
        }
    }
}


/// Fields parsed from one image channel's section of the header.
#[derive(Debug, Clone)]
pub struct TileHeader {
    pub label: String,
    pub data_length: u64,
    pub data_offset: u64,
    pub bytes_per_pixel: RawWidth,
    pub samps_per_line: usize,
    pub number_of_lines: usize,

    /// Already converted from mV to V if the sensitivity token was milli-volt scaled.
    pub z_scale_value: f64,
    pub z_scale_sens_v: f64,

    pub frame_direction: String,
    pub capture_start_line: i64,
    pub color_table_index: i64,
    pub relative_frame_time: f64,
}

/// One decoded image channel: its header fragment plus the raw and
/// physical-units pixel matrices, both stored top-to-bottom (row 0 is the
/// top of the image, matching the on-disk raster reversed at load time).
#[derive(Debug, Clone)]
pub struct Tile {
    pub head: HeadFields,
    pub header: TileHeader,
    pub raw: Vec<Vec<i32>>,
    pub real: Vec<Vec<f64>>,
}

impl Tile {
    pub fn rows(&self) -> usize { self.header.number_of_lines }
    pub fn cols(&self) -> usize { self.header.samps_per_line }
}


fn read_line(reader: &mut impl BufRead) -> std::io::Result<Option<String>> {
    let mut raw_line = Vec::new();
    let bytes_read = reader.read_until(b'\n', &mut raw_line)?;
    if bytes_read == 0 {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(&raw_line);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_owned()))
}

/// Splits the template's text header into the shared head section and the
/// section belonging to `label`, following the same marker-driven walk as
/// `spm_reader.hpp`'s `loadSpmFileTextMap`.
fn split_header_sections(path: &Path, label: &str) -> Result<(String, String)> {
    let file = File::open(path).map_err(|source| Error::file_open(path, source))?;
    let mut reader = BufReader::new(file);

    let mut head_text = String::new();
    let mut current_text = String::new();
    let mut seen_head_marker = false;

    while let Some(line) = read_line(&mut reader)? {
        if line.starts_with("\\*") {
            if line == FILE_LIST_END {
                let this_label = header::get_string(&current_text, IMAGE_LABEL_PATTERN);
                if this_label == label {
                    return Ok((head_text, current_text));
                }
                break;
            }

            if line == CIAO_IMAGE_LIST {
                if !seen_head_marker {
                    head_text = std::mem::take(&mut current_text);
                    seen_head_marker = true;
                } else {
                    let this_label = header::get_string(&current_text, IMAGE_LABEL_PATTERN);
                    if this_label == label {
                        return Ok((head_text, current_text));
                    }
                }

                current_text.clear();
            }
        }

        current_text.push_str(&line);
        current_text.push('\n');
    }

    if !seen_head_marker {
        return Err(Error::malformed_header(path, "no `\\*Ciao image list` section found"));
    }

    Err(Error::malformed_header(path, "requested image label not found in any section"))
}

/// Returns `(z_scale_value, z_scale_sens_v)`. The sensitivity token name
/// (e.g. `Sens. ZsensSens`) is only an intermediate key used to look up
/// `z_scale_sens_v` in the head section; it isn't retained afterwards.
fn parse_z_scale(section_text: &str, head_text: &str) -> (f64, f64) {
    let regex = Regex::new(Z_SCALE_PATTERN).expect("Z_SCALE_PATTERN is a valid regex");

    let (sens_key, mut value) = match regex.captures(section_text) {
        Some(captures) => {
            let key = captures.get(1).map(|m| m.as_str().to_owned()).unwrap_or_default();
            let value: f64 = captures.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0);
            let unit = captures.get(3).map(|m| m.as_str()).unwrap_or("");
            if unit == "mV" { value /= 1000.0; }
            (key, value)
        },
        None => (String::new(), 0.0),
    };

    if sens_key.is_empty() {
        value = 0.0;
    }

    let sens_pattern = format!(r"\\@{}: V (\d+(?:\.\d+)?) .*", regex::escape(&sens_key));
    let sens_v = header::get_double(head_text, &sens_pattern);

    (value, sens_v)
}

fn parse_tile_header(label: &str, section_text: &str, head_text: &str) -> Result<TileHeader> {
    let bytes_per_pixel = RawWidth::from_bytes_per_pixel(
        header::get_int(section_text, BYTES_PER_PIXEL_PATTERN) as u32
    )?;

    let (z_scale_value, z_scale_sens_v) = parse_z_scale(section_text, head_text);

    Ok(TileHeader {
        label: label.to_owned(),
        data_length: header::get_int(section_text, DATA_LENGTH_PATTERN) as u64,
        data_offset: header::get_int(section_text, DATA_OFFSET_PATTERN) as u64,
        bytes_per_pixel,
        samps_per_line: header::get_int(section_text, SAMPS_PER_LINE_PATTERN) as usize,
        number_of_lines: header::get_int(section_text, NUMBER_OF_LINES_PATTERN) as usize,
        z_scale_value,
        z_scale_sens_v,
        frame_direction: header::get_string(section_text, FRAME_DIRECTION_PATTERN),
        capture_start_line: header::get_int(section_text, CAPTURE_START_LINE_PATTERN),
        color_table_index: header::get_int(section_text, COLOR_TABLE_INDEX_PATTERN),
        relative_frame_time: header::get_double(section_text, RELATIVE_FRAME_TIME_PATTERN),
    })
}

fn read_raster(path: &Path, header: &TileHeader) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|source| Error::file_open(path, source))?;
    file.seek(SeekFrom::Start(header.data_offset))?;

    let mut bytes = vec![0_u8; header.data_length as usize];
    file.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Reads the image channel labeled `label` out of the SPM file at `path`.
pub fn load_tile(path: &Path, label: &str) -> Result<Tile> {
    let (head_text, section_text) = split_header_sections(path, label)?;
    let head = HeadFields::parse(&head_text);
    let tile_header = parse_tile_header(label, &section_text, &head_text)?;

    let rows = tile_header.number_of_lines;
    let cols = tile_header.samps_per_line;
    let raster_bytes = read_raster(path, &tile_header)?;

    let samples = spm_io::read_raw_samples_widened(&raster_bytes, tile_header.bytes_per_pixel.bytes(), rows * cols)?;

    let divisor = tile_header.bytes_per_pixel.scale_divisor();
    let mut raw = Vec::with_capacity(rows);
    let mut real = Vec::with_capacity(rows);

    // On disk rows run bottom-to-top; row 0 in the tile is the top of the image.
    for row in 0..rows {
        let source_row = rows - 1 - row;
        let start = source_row * cols;
        let raw_row: Vec<i32> = samples[start .. start + cols].to_vec();

        let real_row: Vec<f64> = raw_row.iter()
            .map(|&sample| sample as f64 * tile_header.z_scale_sens_v * tile_header.z_scale_value / divisor)
            .collect();

        raw.push(raw_row);
        real.push(real_row);
    }

    Ok(Tile { head, header: tile_header, raw, real })
}


/// The handful of fields the write path changes; every other byte of the
/// template is carried through unmodified.
#[derive(Debug, Clone, Copy)]
pub struct WriteFields {
    pub data_length: u64,
    pub z_scale_value: f64,
    pub samps_per_line: usize,
    pub number_of_lines: usize,
    pub scan_size_nm: i64,
}

/// Streams `template_path` into `output_path`, splicing in `fields` for the
/// section labeled `label`, then appends `raster` (already packed to the
/// on-disk pixel width and row order) after the `0x1A`/`0x00` padding that
/// aligns it to the original `data_offset`.
pub fn write_tile(
    template_path: &Path,
    output_path: &Path,
    label: &str,
    fields: &WriteFields,
    raster: &[u8],
) -> Result<()> {
    let (section_index, data_offset) = locate_section(template_path, label)?;
    stream_header(template_path, output_path, section_index, fields)?;
    pad_and_append_raster(output_path, data_offset, raster)
}

/// First pass: walk the template to find which section index (1-based,
/// head is index 0) carries the requested label, and that section's
/// declared `Data offset` (left unchanged by the write, since the raster
/// must land exactly where the untouched header says it starts).
fn locate_section(template_path: &Path, label: &str) -> Result<(usize, u64)> {
    let file = File::open(template_path).map_err(|source| Error::file_open(template_path, source))?;
    let mut reader = BufReader::new(file);

    let mut section_index = 0;
    let mut current_text = String::new();

    while let Some(line) = read_line(&mut reader)? {
        if line.starts_with("\\*") {
            if line == FILE_LIST_END {
                break;
            }

            if line == CIAO_IMAGE_LIST {
                if section_index > 0 {
                    let this_label = header::get_string(&current_text, IMAGE_LABEL_PATTERN);
                    if this_label == label {
                        let data_offset = header::get_int(&current_text, DATA_OFFSET_PATTERN) as u64;
                        return Ok((section_index, data_offset));
                    }
                }

                section_index += 1;
                current_text.clear();
                continue;
            }
        }

        current_text.push_str(&line);
        current_text.push('\n');
    }

    Err(Error::malformed_header(template_path, "requested image label not found in template"))
}

fn stream_header(
    template_path: &Path,
    output_path: &Path,
    section_index: usize,
    fields: &WriteFields,
) -> Result<()> {
    let input = File::open(template_path).map_err(|source| Error::file_open(template_path, source))?;
    let mut reader = BufReader::new(input);
    let mut output = File::create(output_path).map_err(|source| Error::file_open(output_path, source))?;

    let mut section_num = 0;
    let mut section_lines: Vec<String> = Vec::new();

    while let Some(mut line) = read_line(&mut reader)? {
        let is_marker = line == CIAO_IMAGE_LIST || line == FILE_LIST_END;

        if is_marker {
            if section_num == 0 {
                for buffered in &section_lines {
                    writeln!(output, "{}", buffered)?;
                }
            } else if section_num == section_index {
                for buffered in &section_lines {
                    writeln!(output, "{}", buffered)?;
                }
                writeln!(output, "{}", FILE_LIST_END)?;
                return Ok(());
            }

            section_num += 1;
            section_lines.clear();

            if line == FILE_LIST_END {
                break;
            }
        }

        if section_num == section_index && line.starts_with("\\Data length:") {
            header::replace_int(&mut line, DATA_LENGTH_PATTERN, fields.data_length as i64);
        }
        if section_num == section_index && line.starts_with("\\Samps/line:") {
            header::replace_int(&mut line, SAMPS_PER_LINE_PATTERN, fields.samps_per_line as i64);
        }
        if section_num == section_index && line.starts_with("\\Number of lines:") {
            header::replace_int(&mut line, NUMBER_OF_LINES_PATTERN, fields.number_of_lines as i64);
        }
        if section_num == section_index && line.starts_with("\\Valid data len X:") {
            header::replace_int(&mut line, r"\\Valid data len X: (\d+)", fields.samps_per_line as i64);
        }
        if section_num == section_index && line.starts_with("\\Valid data len Y:") {
            header::replace_int(&mut line, r"\\Valid data len Y: (\d+)", fields.number_of_lines as i64);
        }

        // Z scale and Scan Size apply wherever they occur, independent of section.
        if line.starts_with("\\@2:Z scale: V") {
            header::replace_double(&mut line, Z_SCALE_VALUE_PATTERN, fields.z_scale_value);
        }
        if line.starts_with("\\Scan Size:") {
            header::replace_int(&mut line, SCAN_SIZE_PATTERN, fields.scan_size_nm);
        }

        section_lines.push(line);
    }

    writeln!(output, "{}", FILE_LIST_END)?;
    Ok(())
}

/// Pads the freshly streamed header up to `data_offset` before appending the
/// raster, so the raster lands exactly where the (unchanged) `Data offset`
/// field in the output header says it does.
fn pad_and_append_raster(output_path: &Path, data_offset: u64, raster: &[u8]) -> Result<()> {
    let current_size = output_path.metadata()?.len();

    let mut output = std::fs::OpenOptions::new().append(true).open(output_path)?;

    if current_size < data_offset {
        output.write_all(&[0x1A])?;
        let zero_count = (data_offset - current_size - 1) as usize;
        output.write_all(&vec![0_u8; zero_count])?;
    }

    output.write_all(raster)?;
    Ok(())
}
