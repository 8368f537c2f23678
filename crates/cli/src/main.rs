use clap::Parser;
use rain_garden_core::runoff::DEFAULT_GARDEN_SIZE_SQFT;
use rain_garden_core::{
    DataSource, PipelineConfig, PipelineResult, RainGardenSession, SessionSources, SoilProfile,
    SourceStatus,
};
use std::convert::Infallible;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Rain garden planner: stormwater data summary for one session
#[derive(Parser, Debug)]
#[command(name = "rain-garden")]
#[command(about = "Load boundary, elevation and storm data and estimate rain garden runoff reduction", long_about = None)]
struct Args {
    /// Boundary layer (`GeoJSON` path or http(s) URL)
    #[arg(short, long, value_parser = parse_source)]
    boundary: DataSource,

    /// Elevation raster (`GeoTIFF` path or http(s) URL)
    #[arg(short, long, value_parser = parse_source)]
    elevation: DataSource,

    /// Storm location table (CSV path or http(s) URL)
    #[arg(short, long, value_parser = parse_source)]
    storms: DataSource,

    /// Elevation downsampling stride (overrides `RAIN_GARDEN_DOWNSAMPLE_STRIDE`)
    #[arg(long)]
    stride: Option<usize>,

    /// Heatmap kernel radius (overrides `RAIN_GARDEN_HEATMAP_RADIUS`)
    #[arg(long)]
    radius: Option<f64>,

    /// Garden size in square feet (50-500)
    #[arg(short = 'g', long, default_value_t = DEFAULT_GARDEN_SIZE_SQFT)]
    garden_size: f64,

    /// Soil type (clay, sandy, loamy)
    #[arg(long, default_value = "Clay")]
    soil: SoilProfile,

    /// Storm location to list events for (defaults to the first location)
    #[arg(short, long)]
    location: Option<String>,

    /// Event label to show details for, as printed in the event list
    #[arg(long)]
    event: Option<String>,
}

fn parse_source(arg: &str) -> Result<DataSource, Infallible> {
    Ok(DataSource::parse(arg))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> PipelineResult<()> {
    let mut config = PipelineConfig::from_env();
    if let Some(stride) = args.stride {
        config = config.with_downsample_stride(stride);
    }
    if let Some(radius) = args.radius {
        config = config.with_heatmap_radius(radius);
    }

    let sources = SessionSources {
        boundary: args.boundary.clone(),
        elevation: args.elevation.clone(),
        storms: args.storms.clone(),
    };

    println!("=== Rain Garden Planner ===\n");
    let session = RainGardenSession::open(&sources, config)?;

    println!("Sources:");
    for (kind, status) in session.status().entries() {
        match status {
            SourceStatus::Ready => println!("  {kind:<10} ready"),
            SourceStatus::Failed { message, .. } => println!("  {kind:<10} FAILED: {message}"),
        }
    }

    print_boundaries(&session);
    print_elevation(&session);
    print_storms(&session, args);

    // Runoff is independent of the loaded data, so input errors are fatal
    let estimate = session.runoff(args.garden_size, args.soil)?;
    println!("\nRain garden");
    println!(
        "  {:.0} sq ft on {} soil reduces runoff by {}",
        estimate.size_sqft(),
        estimate.soil(),
        estimate
    );

    Ok(())
}

fn print_boundaries(session: &RainGardenSession) {
    let Ok(boundaries) = session.boundaries() else {
        return;
    };
    println!("\nMS4 service areas: {} features", boundaries.len());
    for locality in boundaries.localities() {
        println!("  - {locality}");
    }
    if let Some(extent) = boundaries.extent() {
        println!(
            "  extent: lat {:.4}..{:.4}, lon {:.4}..{:.4}",
            extent.min_lat, extent.max_lat, extent.min_lon, extent.max_lon
        );
    }
}

fn print_elevation(session: &RainGardenSession) {
    let grid = match session.elevation(None) {
        Ok(grid) => grid,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping elevation summary");
            return;
        }
    };

    println!(
        "\nElevation: {}x{} cells after stride {}",
        grid.rows(),
        grid.cols(),
        grid.stride()
    );
    match grid.statistics() {
        Some(stats) => println!(
            "  min {:.2} m, max {:.2} m, mean {:.2} m ({} nodata cells)",
            stats.min, stats.max, stats.mean, stats.nodata_cells
        ),
        None => println!("  every cell is nodata"),
    }
}

fn print_storms(session: &RainGardenSession, args: &Args) {
    let Ok(locations) = session.storm_locations() else {
        return;
    };
    println!("\nStorm locations: {}", locations.len());

    let location = args
        .location
        .as_deref()
        .or_else(|| locations.first().map(String::as_str));
    if let Some(location) = location {
        let events = session.storm_events(location).unwrap_or_default();
        println!("\nEvents for {location}:");
        if events.is_empty() {
            println!("  No events available for this location.");
        }
        for event in &events {
            println!("  {}", event.label());
        }

        if let Some(label) = &args.event {
            match session.storm_event(location, label) {
                Ok(event) => match (event.latitude(), event.longitude()) {
                    (Some(lat), Some(lon)) => println!("\nSelected event at ({lat:.4}, {lon:.4})"),
                    _ => println!("\nSelected event has no recorded coordinates"),
                },
                Err(e) => println!("\n{e}"),
            }
        }
    }

    if let Ok(heatmap) = session.heatmap(args.location.as_deref()) {
        println!(
            "\nHeatmap: {} points, radius {}",
            heatmap.len(),
            heatmap.radius()
        );
        if let Some(hotspot) = heatmap.density(0.1).ok().and_then(|cells| cells.into_iter().next()) {
            println!(
                "  densest 0.1 deg cell at ({:.2}, {:.2}) with {} events",
                hotspot.center.lat, hotspot.center.lon, hotspot.count
            );
        }
    }
}
