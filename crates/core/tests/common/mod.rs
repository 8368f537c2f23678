//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two Hampton Roads MS4 areas, one of them multi-part
pub const MS4_AREAS: &str = r#"{
  "type": "FeatureCollection",
  "name": "Hampton_Roads_MS4_Service_Areas",
  "features": [
    {
      "type": "Feature",
      "properties": {"OBJECTID": 1, "LOCALITY": "Norfolk", "PERMIT": "VA0088650"},
      "geometry": {"type": "Polygon", "coordinates": [[[-76.33, 36.83], [-76.18, 36.83], [-76.18, 36.97], [-76.33, 36.97], [-76.33, 36.83]]]}
    },
    {
      "type": "Feature",
      "properties": {"OBJECTID": 2, "LOCALITY": "Hampton", "PERMIT": "VA0088633"},
      "geometry": {"type": "MultiPolygon", "coordinates": [
        [[[-76.45, 37.0], [-76.28, 37.0], [-76.28, 37.1], [-76.45, 37.0]]],
        [[[-76.3, 37.12], [-76.29, 37.12], [-76.29, 37.13], [-76.3, 37.12]]]
      ]}
    }
  ]
}"#;

/// Storm location rows in the NOAA `StormEvents_locations` layout
pub const STORM_LOCATIONS: &str = "\
YEARMONTH,EPISODE_ID,EVENT_ID,LOCATION_INDEX,RANGE,AZIMUTH,LOCATION,LATITUDE,LONGITUDE,LAT2,LON2
202401,189001,1,1,1.0,N,Norfolk,36.9,-76.2,3654000,7612000
202402,189002,2,1,0.5,SE,Norfolk,,,,
202403,189003,3,1,2.0,W,Hampton,37.03,-76.35,3701800,7621000
202404,189004,4,1,1.2,NW,hampton,37.05,-76.33,3703000,7619800
202405,189005,5,1,0.8,E,Chesapeake,36.72,-76.25,3643200,7615000
202406,189006,6,1,0.3,S,Virginia Beach,36.85,-75.98,3651000,7558800
";

/// Encode a single-band `f32` `GeoTIFF` whose upper-left corner sits at
/// (`origin_lat`, `origin_lon`) with square pixels of `pixel_deg`
pub fn geotiff_bytes(
    width: u32,
    height: u32,
    data: &[f32],
    origin_lat: f64,
    origin_lon: f64,
    pixel_deg: f64,
    nodata: Option<&str>,
) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buf).unwrap();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(width, height)
            .unwrap();

        let scale = [pixel_deg, pixel_deg, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, origin_lon, origin_lat, 0.0];
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(33550), &scale[..])
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(33922), &tiepoint[..])
            .unwrap();
        if let Some(nodata) = nodata {
            image
                .encoder()
                .write_tag(Tag::from_u16_exhaustive(42113), nodata)
                .unwrap();
        }
        image.write_data(data).unwrap();
    }
    buf.into_inner()
}

/// Fresh scratch directory under the system temp dir
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rain-garden-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
