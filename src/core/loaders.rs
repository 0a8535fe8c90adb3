//! Loaders for single-band detection rasters.
//!
//! This module provides readers for:
//! - ESRI ASCII grids (`.asc`), with an optional `.prj` sidecar holding the CRS
//! - GeoTIFF files with integer samples, georeferenced through the
//!   `ModelPixelScale`/`ModelTiepoint` or `ModelTransformation` tags
//!
//! Every raster carries a mask: a pixel is observed iff it differs from the
//! nodata value and, when a separate mask raster is supplied, the mask pixel
//! is non-zero.

use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, warn};
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;

use super::transforms::GeoTransform;
use crate::config::RasterConfig;

/// GeoKey holding the EPSG code of a projected CRS.
const PROJECTED_CS_TYPE_GEO_KEY: u32 = 3072;
/// GeoKey holding the EPSG code of a geographic CRS.
const GEOGRAPHIC_TYPE_GEO_KEY: u32 = 2048;
/// GeoKey telling whether pixel values describe areas or points.
const RASTER_TYPE_GEO_KEY: u32 = 1025;
const RASTER_PIXEL_IS_POINT: u32 = 2;
const USER_DEFINED_GEO_KEY_VALUE: u32 = 32767;

/// Errors that can occur during raster loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("cannot read raster '{path}': {reason}")]
    UnreadableRaster { path: PathBuf, reason: String },

    #[error("invalid raster header in '{path}': {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("unsupported sample format in '{path}': {detail}")]
    UnsupportedSampleFormat { path: PathBuf, detail: String },

    #[error("mask is {found_width}x{found_height} but raster is {width}x{height}")]
    DimensionMismatch {
        width: usize,
        height: usize,
        found_width: usize,
        found_height: usize,
    },

    #[error("invalid CRS definition: {0}")]
    InvalidCrs(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

fn unreadable(path: &Path, reason: impl fmt::Display) -> LoaderError {
    LoaderError::UnreadableRaster {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn invalid_header(path: &Path, reason: impl Into<String>) -> LoaderError {
    LoaderError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Coordinate reference system attached to a raster and its outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Crs {
    /// Registered EPSG code.
    Epsg(u32),
    /// Free-form WKT definition.
    Wkt(String),
}

impl Crs {
    /// OGC URN usable as a GeoJSON named CRS, when the CRS has an EPSG code.
    pub fn ogc_urn(&self) -> Option<String> {
        match self {
            Crs::Epsg(code) => Some(format!("urn:ogc:def:crs:EPSG::{}", code)),
            Crs::Wkt(_) => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Wkt(wkt) => f.write_str(wkt),
        }
    }
}

impl FromStr for Crs {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some((authority, code)) = s.split_once(':') {
            if authority.eq_ignore_ascii_case("epsg") {
                return code
                    .trim()
                    .parse::<u32>()
                    .map(Crs::Epsg)
                    .map_err(|_| LoaderError::InvalidCrs(s.to_string()));
            }
        }
        if s.contains('[') && s.ends_with(']') {
            return Ok(Crs::Wkt(s.to_string()));
        }
        Err(LoaderError::InvalidCrs(s.to_string()))
    }
}

/// Single-band integer raster with its observation mask.
#[derive(Debug, Clone)]
pub struct Raster {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Pixel values in row-major order.
    pub values: Vec<i64>,
    /// Observation mask in row-major order (`true` = observed).
    pub observed: Vec<bool>,
    /// Pixel-to-map transform.
    pub transform: GeoTransform,
    /// Spatial reference, when known.
    pub crs: Option<Crs>,
    /// Value marking unobserved pixels.
    pub nodata: Option<i64>,
}

impl Raster {
    /// Build an in-memory raster where every pixel is observed unless it equals `nodata`.
    pub fn from_values(
        width: usize,
        height: usize,
        values: Vec<i64>,
        transform: GeoTransform,
        nodata: Option<i64>,
    ) -> Self {
        debug_assert_eq!(values.len(), width * height, "values must cover the grid");
        let mut raster = Self {
            width,
            height,
            observed: vec![true; values.len()],
            values,
            transform,
            crs: None,
            nodata: None,
        };
        raster.set_nodata(nodata);
        raster
    }

    /// Row-major index of pixel `(col, row)`.
    #[inline]
    pub fn index(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    /// Value of an observed pixel, `None` if masked or out of bounds.
    #[inline]
    pub fn value(&self, col: usize, row: usize) -> Option<i64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let idx = self.index(col, row);
        self.observed[idx].then(|| self.values[idx])
    }

    /// Number of observed pixels.
    pub fn observed_count(&self) -> usize {
        self.observed.iter().filter(|&&o| o).count()
    }

    /// Replace the nodata value and recompute the mask from it.
    ///
    /// Pixels hidden by a previously applied mask raster become visible again,
    /// so call this before [`Raster::apply_mask`].
    pub fn set_nodata(&mut self, nodata: Option<i64>) {
        self.nodata = nodata;
        match nodata {
            Some(nd) => {
                for (obs, &v) in self.observed.iter_mut().zip(&self.values) {
                    *obs = v != nd;
                }
            }
            None => self.observed.iter_mut().for_each(|o| *o = true),
        }
    }

    /// Hide every pixel whose mask value is zero or masked itself.
    pub fn apply_mask(&mut self, mask: &Raster) -> Result<()> {
        if mask.width != self.width || mask.height != self.height {
            return Err(LoaderError::DimensionMismatch {
                width: self.width,
                height: self.height,
                found_width: mask.width,
                found_height: mask.height,
            });
        }
        for (i, obs) in self.observed.iter_mut().enumerate() {
            *obs &= mask.observed[i] && mask.values[i] != 0;
        }
        Ok(())
    }
}

/// Load a detection raster and apply the configured mask, nodata and CRS.
///
/// The format is chosen from the file extension: `.asc`/`.txt` are read as
/// ESRI ASCII grids, `.tif`/`.tiff` as GeoTIFF.
///
/// # Errors
///
/// Returns [`LoaderError::UnreadableRaster`] if the file cannot be opened or
/// decoded, and other variants for malformed headers or masks.
pub fn load_raster<P: AsRef<Path>>(path: P, config: &RasterConfig) -> Result<Raster> {
    let path = path.as_ref();
    let mut raster = read_any(path)?;

    if let Some(nodata) = config.nodata {
        raster.set_nodata(Some(nodata));
    }

    if let Some(ref mask_path) = config.mask_path {
        let mask = read_any(mask_path)?;
        raster.apply_mask(&mask)?;
        debug!("applied mask band from {}", mask_path.display());
    }

    if let Some(ref crs) = config.crs {
        let crs: Crs = crs.parse()?;
        if config.force_crs || raster.crs.is_none() {
            raster.crs = Some(crs);
        }
    }
    if raster.crs.is_none() {
        warn!("{}: no CRS found, outputs will carry none", path.display());
    }

    info!(
        "{}: {}x{} raster, {} observed pixels",
        path.display(),
        raster.width,
        raster.height,
        raster.observed_count()
    );
    Ok(raster)
}

fn read_any(path: &Path) -> Result<Raster> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("asc") | Some("txt") => load_ascii_grid(path),
        Some("tif") | Some("tiff") => load_geotiff(path),
        _ => Err(unreadable(path, "unsupported raster format")),
    }
}

/// Load an ESRI ASCII grid.
///
/// Recognised header keys (case-insensitive): `ncols`, `nrows`,
/// `xllcorner`/`xllcenter`, `yllcorner`/`yllcenter`, `cellsize` and the
/// optional `nodata_value`. A sibling `.prj` file, when present, provides the
/// CRS as WKT or `EPSG:<code>`.
pub fn load_ascii_grid<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| unreadable(path, e))?;
    let mut raster = parse_ascii_grid(path, &content)?;

    let prj = path.with_extension("prj");
    if prj.is_file() {
        let text = fs::read_to_string(&prj).map_err(|e| unreadable(&prj, e))?;
        raster.crs = Some(text.parse()?);
    }
    Ok(raster)
}

fn parse_ascii_grid(path: &Path, content: &str) -> Result<Raster> {
    let mut ncols: Option<usize> = None;
    let mut nrows: Option<usize> = None;
    let mut xll: Option<(f64, bool)> = None;
    let mut yll: Option<(f64, bool)> = None;
    let mut cellsize: Option<f64> = None;
    let mut nodata: Option<i64> = None;

    let mut tokens = content.split_whitespace().peekable();

    // Header lines are "key value" pairs; the first numeric token starts the data
    while let Some(&key) = tokens.peek() {
        if key.parse::<f64>().is_ok() {
            break;
        }
        tokens.next();
        let value = tokens
            .next()
            .ok_or_else(|| invalid_header(path, format!("missing value for '{}'", key)))?;
        let number: f64 = value
            .parse()
            .map_err(|_| invalid_header(path, format!("'{}' is not a number", value)))?;

        match key.to_ascii_lowercase().as_str() {
            "ncols" => ncols = Some(grid_dimension(path, "ncols", number)?),
            "nrows" => nrows = Some(grid_dimension(path, "nrows", number)?),
            "xllcorner" => xll = Some((number, false)),
            "xllcenter" => xll = Some((number, true)),
            "yllcorner" => yll = Some((number, false)),
            "yllcenter" => yll = Some((number, true)),
            "cellsize" => cellsize = Some(number),
            "nodata_value" => nodata = Some(number as i64),
            other => return Err(invalid_header(path, format!("unknown key '{}'", other))),
        }
    }

    let width = ncols.ok_or_else(|| invalid_header(path, "missing ncols"))?;
    let height = nrows.ok_or_else(|| invalid_header(path, "missing nrows"))?;
    let cellsize = cellsize.ok_or_else(|| invalid_header(path, "missing cellsize"))?;
    let (x, x_center) = xll.ok_or_else(|| invalid_header(path, "missing xllcorner"))?;
    let (y, y_center) = yll.ok_or_else(|| invalid_header(path, "missing yllcorner"))?;

    if cellsize <= 0.0 || !cellsize.is_finite() {
        return Err(invalid_header(path, "cellsize must be positive"));
    }

    let half = cellsize / 2.0;
    let left = if x_center { x - half } else { x };
    let bottom = if y_center { y - half } else { y };
    let top = bottom + height as f64 * cellsize;

    let cells = width
        .checked_mul(height)
        .ok_or_else(|| invalid_header(path, format!("{}x{} grid is too large", width, height)))?;

    // Count before allocating so a bogus header cannot request a huge buffer
    let tokens: Vec<&str> = tokens.collect();
    if tokens.len() != cells {
        return Err(invalid_header(
            path,
            format!(
                "expected {} cells for {}x{} grid, found {}",
                cells,
                width,
                height,
                tokens.len()
            ),
        ));
    }
    let values = tokens
        .into_iter()
        .map(|token| parse_cell(path, token))
        .collect::<Result<Vec<i64>>>()?;

    Ok(Raster::from_values(
        width,
        height,
        values,
        GeoTransform::north_up(left, top, cellsize),
        nodata,
    ))
}

/// Grid sizes must be whole, non-negative and representable as `usize`.
fn grid_dimension(path: &Path, key: &str, number: f64) -> Result<usize> {
    // usize::MAX as f64 rounds up to 2^64, hence the strict bound
    if number >= 0.0 && number.fract() == 0.0 && number < usize::MAX as f64 {
        return Ok(number as usize);
    }
    Err(invalid_header(
        path,
        format!("{} must be a non-negative integer, found {}", key, number),
    ))
}

fn parse_cell(path: &Path, token: &str) -> Result<i64> {
    if let Ok(v) = token.parse::<i64>() {
        return Ok(v);
    }
    match token.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.is_finite() => Ok(v as i64),
        _ => Err(LoaderError::UnsupportedSampleFormat {
            path: path.to_path_buf(),
            detail: format!("non-integer cell value '{}'", token),
        }),
    }
}

/// Load a single-band integer GeoTIFF.
///
/// Nodata comes from the `GDAL_NODATA` tag, the CRS from the
/// `ProjectedCSTypeGeoKey` or `GeographicTypeGeoKey` GeoKeys.
pub fn load_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| unreadable(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| unreadable(path, e))?;

    match decoder.colortype().map_err(|e| unreadable(path, e))? {
        ColorType::Gray(_) => {}
        other => {
            return Err(LoaderError::UnsupportedSampleFormat {
                path: path.to_path_buf(),
                detail: format!("expected a single band, found {:?}", other),
            })
        }
    }

    let (width, height) = decoder.dimensions().map_err(|e| unreadable(path, e))?;
    let (width, height) = (width as usize, height as usize);

    let values: Vec<i64> = match decoder.read_image().map_err(|e| unreadable(path, e))? {
        DecodingResult::U8(v) => v.into_iter().map(i64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(i64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(i64::from).collect(),
        DecodingResult::I8(v) => v.into_iter().map(i64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(i64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(i64::from).collect(),
        DecodingResult::I64(v) => v,
        _ => {
            return Err(LoaderError::UnsupportedSampleFormat {
                path: path.to_path_buf(),
                detail: "only integer samples up to 64 bits signed are supported".to_string(),
            })
        }
    };

    let geo_keys = decoder
        .get_tag_u32_vec(Tag::GeoKeyDirectoryTag)
        .unwrap_or_default();
    let pixel_is_point = geo_key(&geo_keys, RASTER_TYPE_GEO_KEY) == Some(RASTER_PIXEL_IS_POINT);

    let mut transform = geotiff_transform(&mut decoder).unwrap_or_else(|| {
        warn!("{}: no georeferencing tags, using pixel space", path.display());
        GeoTransform::default()
    });
    if pixel_is_point {
        // Tie points address pixel centres; shift to the corner convention
        let corner = transform.apply(-0.5, -0.5);
        transform.origin_x = corner.x;
        transform.origin_y = corner.y;
    }

    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok())
        .map(|v| v as i64);

    let crs = geo_key(&geo_keys, PROJECTED_CS_TYPE_GEO_KEY)
        .or_else(|| geo_key(&geo_keys, GEOGRAPHIC_TYPE_GEO_KEY))
        .filter(|&code| code != USER_DEFINED_GEO_KEY_VALUE)
        .map(Crs::Epsg);

    let mut raster = Raster::from_values(width, height, values, transform, nodata);
    raster.crs = crs;
    Ok(raster)
}

fn geotiff_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(Tag::ModelTransformationTag) {
        if m.len() >= 8 {
            return Some(GeoTransform {
                origin_x: m[3],
                pixel_width: m[0],
                row_rotation: m[1],
                origin_y: m[7],
                col_rotation: m[4],
                pixel_height: m[5],
            });
        }
    }

    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tie = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;
    if scale.len() < 2 || tie.len() < 6 {
        return None;
    }
    let (sx, sy) = (scale[0], scale[1]);
    let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
    Some(GeoTransform {
        origin_x: x - i * sx,
        pixel_width: sx,
        row_rotation: 0.0,
        origin_y: y + j * sy,
        col_rotation: 0.0,
        pixel_height: -sy,
    })
}

/// Look up an inline SHORT value in a GeoKey directory.
fn geo_key(directory: &[u32], key: u32) -> Option<u32> {
    if directory.len() < 4 {
        return None;
    }
    let count = directory[3] as usize;
    directory[4..]
        .chunks_exact(4)
        .take(count)
        .find(|entry| entry[0] == key && entry[1] == 0)
        .map(|entry| entry[3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use tiff::encoder::{colortype, DirectoryEncoder, TiffEncoder, TiffKindStandard};

    const GRID: &str = "ncols 4\n\
                        nrows 3\n\
                        xllcorner 1000.0\n\
                        yllcorner 2000.0\n\
                        cellsize 10.0\n\
                        NODATA_value -9999\n\
                        19032 19032 -9999 0\n\
                        -9999 19040 -9999 0\n\
                        0 0 0 20001\n";

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_ascii_grid() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "dates.asc", GRID);

        let raster = load_ascii_grid(&path).unwrap();
        assert_eq!(raster.width, 4);
        assert_eq!(raster.height, 3);
        assert_eq!(raster.nodata, Some(-9999));
        assert_eq!(raster.value(0, 0), Some(19032));
        assert_eq!(raster.value(2, 0), None);
        assert_eq!(raster.value(3, 2), Some(20001));
        assert_eq!(raster.observed_count(), 9);

        // Top-left corner sits nrows * cellsize above yllcorner
        let corner = raster.transform.apply(0.0, 0.0);
        assert_eq!(corner.x, 1000.0);
        assert_eq!(corner.y, 2030.0);
        assert!(raster.crs.is_none());
    }

    #[test]
    fn test_load_ascii_grid_with_prj() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "dates.asc", GRID);
        write_file(dir.path(), "dates.prj", "EPSG:2154\n");

        let raster = load_ascii_grid(&path).unwrap();
        assert_eq!(raster.crs, Some(Crs::Epsg(2154)));
    }

    #[test]
    fn test_load_ascii_grid_cell_count_mismatch() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "short.asc",
            "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n",
        );
        assert!(matches!(
            load_ascii_grid(&path),
            Err(LoaderError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_ascii_grid_oversized_header_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "huge.asc",
            "ncols 1e19\nnrows 4\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2\n",
        );
        match load_ascii_grid(&path) {
            Err(LoaderError::InvalidHeader { reason, .. }) => {
                assert!(reason.contains("too large"), "{}", reason)
            }
            other => panic!("expected InvalidHeader, got {:?}", other),
        }
    }

    #[test]
    fn test_ascii_grid_dimensions_must_be_whole() {
        let dir = tempdir().unwrap();
        for header in ["ncols 2.5\nnrows 2", "ncols -2\nnrows 2", "ncols 2\nnrows 1e300"] {
            let content = format!("{}\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3 4\n", header);
            let path = write_file(dir.path(), "bad.asc", &content);
            assert!(
                matches!(load_ascii_grid(&path), Err(LoaderError::InvalidHeader { .. })),
                "header {:?} accepted",
                header
            );
        }
    }

    #[test]
    fn test_ascii_grid_counts_cells_before_parsing() {
        // Too many cells is a header problem even if one of them is malformed
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "long.asc",
            "ncols 1\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 x\n",
        );
        assert!(matches!(
            load_ascii_grid(&path),
            Err(LoaderError::InvalidHeader { .. })
        ));
    }

    /// Write a single-band i16 GeoTIFF, letting `tags` add georeferencing.
    fn write_geotiff<F>(path: &Path, width: u32, height: u32, data: &[i16], tags: F)
    where
        F: FnOnce(&mut DirectoryEncoder<'_, File, TiffKindStandard>),
    {
        let file = File::create(path).unwrap();
        let mut tiff = TiffEncoder::new(file).unwrap();
        let mut image = tiff.new_image::<colortype::GrayI16>(width, height).unwrap();
        tags(image.encoder());
        image.write_data(data).unwrap();
    }

    #[test]
    fn test_load_geotiff_scale_and_tiepoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dates.tif");
        let data: [i16; 6] = [19032, 19032, -9999, 0, 19040, 20001];
        write_geotiff(&path, 3, 2, &data, |ifd| {
            ifd.write_tag(Tag::ModelPixelScaleTag, &[10.0f64, 10.0, 0.0][..])
                .unwrap();
            ifd.write_tag(
                Tag::ModelTiepointTag,
                &[0.0f64, 0.0, 0.0, 500_000.0, 6_000_000.0, 0.0][..],
            )
            .unwrap();
            ifd.write_tag(
                Tag::GeoKeyDirectoryTag,
                &[1u16, 1, 0, 2, 1025, 0, 1, 1, 3072, 0, 1, 2154][..],
            )
            .unwrap();
            ifd.write_tag(Tag::GdalNodata, "-9999").unwrap();
        });

        let raster = load_raster(&path, &RasterConfig::default()).unwrap();
        assert_eq!((raster.width, raster.height), (3, 2));
        assert_eq!(raster.nodata, Some(-9999));
        assert_eq!(raster.value(0, 0), Some(19032));
        assert_eq!(raster.value(2, 0), None);
        assert_eq!(raster.value(2, 1), Some(20001));
        assert_eq!(raster.observed_count(), 5);
        assert_eq!(raster.crs, Some(Crs::Epsg(2154)));

        let top_left = raster.transform.apply(0.0, 0.0);
        assert_eq!((top_left.x, top_left.y), (500_000.0, 6_000_000.0));
        let bottom_right = raster.transform.apply(3.0, 2.0);
        assert_eq!((bottom_right.x, bottom_right.y), (500_030.0, 5_999_980.0));
    }

    #[test]
    fn test_load_geotiff_transformation_matrix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("matrix.tif");
        #[rustfmt::skip]
        let matrix = [
            2.0f64, 0.0, 0.0, 100.0,
            0.0, -2.0, 0.0, 200.0,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        write_geotiff(&path, 2, 2, &[1, 2, 3, 4], |ifd| {
            ifd.write_tag(Tag::ModelTransformationTag, &matrix[..]).unwrap();
        });

        let raster = load_geotiff(&path).unwrap();
        let c = raster.transform.apply(1.0, 1.0);
        assert_eq!((c.x, c.y), (102.0, 198.0));
        // No GeoKeys and no nodata tag
        assert!(raster.crs.is_none());
        assert_eq!(raster.nodata, None);
        assert_eq!(raster.observed_count(), 4);
    }

    #[test]
    fn test_load_geotiff_pixel_is_point_geographic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("points.tif");
        write_geotiff(&path, 2, 2, &[1, 1, 1, 1], |ifd| {
            ifd.write_tag(Tag::ModelPixelScaleTag, &[10.0f64, 10.0, 0.0][..])
                .unwrap();
            ifd.write_tag(
                Tag::ModelTiepointTag,
                &[0.0f64, 0.0, 0.0, 100.0, 200.0, 0.0][..],
            )
            .unwrap();
            ifd.write_tag(
                Tag::GeoKeyDirectoryTag,
                &[1u16, 1, 0, 2, 1025, 0, 1, 2, 2048, 0, 1, 4326][..],
            )
            .unwrap();
        });

        let raster = load_geotiff(&path).unwrap();
        // The tie point names the centre of the first pixel
        let corner = raster.transform.apply(0.0, 0.0);
        assert_eq!((corner.x, corner.y), (95.0, 205.0));
        assert_eq!(raster.crs, Some(Crs::Epsg(4326)));
    }

    #[test]
    fn test_load_geotiff_user_defined_crs_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.tif");
        write_geotiff(&path, 1, 1, &[1], |ifd| {
            ifd.write_tag(
                Tag::GeoKeyDirectoryTag,
                &[1u16, 1, 0, 1, 3072, 0, 1, 32767][..],
            )
            .unwrap();
        });

        let raster = load_geotiff(&path).unwrap();
        assert!(raster.crs.is_none());
        assert_eq!(raster.transform, GeoTransform::default());
    }

    #[test]
    fn test_load_geotiff_rejects_float_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.tif");
        let file = File::create(&path).unwrap();
        TiffEncoder::new(file)
            .unwrap()
            .write_image::<colortype::Gray32Float>(2, 1, &[1.5, 2.5])
            .unwrap();

        assert!(matches!(
            load_geotiff(&path),
            Err(LoaderError::UnsupportedSampleFormat { .. })
        ));
    }

    #[test]
    fn test_load_geotiff_rejects_rgb() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rgb.tif");
        let file = File::create(&path).unwrap();
        TiffEncoder::new(file)
            .unwrap()
            .write_image::<colortype::RGB8>(1, 1, &[255, 0, 0])
            .unwrap();

        assert!(matches!(
            load_geotiff(&path),
            Err(LoaderError::UnsupportedSampleFormat { .. })
        ));
    }

    #[test]
    fn test_missing_raster_is_unreadable() {
        let dir = tempdir().unwrap();
        let result = load_raster(dir.path().join("nope.tif"), &RasterConfig::default());
        assert!(matches!(result, Err(LoaderError::UnreadableRaster { .. })));

        let result = load_raster(dir.path().join("nope.asc"), &RasterConfig::default());
        assert!(matches!(result, Err(LoaderError::UnreadableRaster { .. })));
    }

    #[test]
    fn test_load_raster_with_mask_and_overrides() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "dates.asc", GRID);
        let mask_path = write_file(
            dir.path(),
            "mask.asc",
            "ncols 4\nnrows 3\nxllcorner 1000\nyllcorner 2000\ncellsize 10\n\
             1 0 1 1\n1 1 1 1\n1 1 1 1\n",
        );

        let config = RasterConfig {
            nodata: Some(0),
            mask_path: Some(mask_path),
            crs: Some("EPSG:32631".to_string()),
            force_crs: false,
        };
        let raster = load_raster(&path, &config).unwrap();

        // nodata override turns the -9999 cells back into observed values
        assert_eq!(raster.value(2, 0), Some(-9999));
        assert_eq!(raster.value(3, 0), None);
        // masked by the mask band
        assert_eq!(raster.value(1, 0), None);
        assert_eq!(raster.value(0, 0), Some(19032));
        assert_eq!(raster.crs, Some(Crs::Epsg(32631)));
    }

    #[test]
    fn test_mask_dimension_mismatch() {
        let mut raster = Raster::from_values(2, 1, vec![1, 2], GeoTransform::default(), None);
        let mask = Raster::from_values(1, 1, vec![1], GeoTransform::default(), None);
        assert!(matches!(
            raster.apply_mask(&mask),
            Err(LoaderError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_crs_parsing() {
        assert_eq!("EPSG:2154".parse::<Crs>().unwrap(), Crs::Epsg(2154));
        assert_eq!("epsg: 4326".parse::<Crs>().unwrap(), Crs::Epsg(4326));
        assert!(matches!(
            "PROJCS[\"x\",GEOGCS[\"y\"]]".parse::<Crs>().unwrap(),
            Crs::Wkt(_)
        ));
        assert!("EPSG:abc".parse::<Crs>().is_err());
        assert!("garbage".parse::<Crs>().is_err());
        assert_eq!(
            Crs::Epsg(2154).ogc_urn().as_deref(),
            Some("urn:ogc:def:crs:EPSG::2154")
        );
    }

    #[test]
    fn test_geo_key_lookup() {
        let directory = vec![1, 1, 0, 2, 1025, 0, 1, 1, 3072, 0, 1, 2154];
        assert_eq!(geo_key(&directory, PROJECTED_CS_TYPE_GEO_KEY), Some(2154));
        assert_eq!(geo_key(&directory, RASTER_TYPE_GEO_KEY), Some(1));
        assert_eq!(geo_key(&directory, GEOGRAPHIC_TYPE_GEO_KEY), None);
        assert_eq!(geo_key(&[], GEOGRAPHIC_TYPE_GEO_KEY), None);
    }
}
