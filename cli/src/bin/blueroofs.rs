use blueroofs::{
    AreaAnalyzer, BlueRoofDetector, DetectorParams, FootprintUnion, GeoJsonSource, Region, ResultTable,
    SceneDirectory, flag_buildings, io::geojson,
};
use clap::{Parser, Subcommand};
use cli::{AnalysisPlan, area_label};
use color_eyre::eyre::{Result, bail};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count blue roofs for every area of an analysis plan
    Analyze {
        /// Path to the TOML or JSON plan
        #[arg(short, long)]
        plan: PathBuf,
        /// Where to write the result table (defaults to <output_dir>/results.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Detect blue roofs in a single scene
    Detect {
        /// Scene directory
        #[arg(short, long)]
        scenes: PathBuf,
        /// Image id within the scene directory
        #[arg(long)]
        id: String,
        /// Area name for the result row (defaults to the scene directory name)
        #[arg(long)]
        area: Option<String>,
        /// Bounding box: MIN_X MIN_Y MAX_X MAX_Y
        #[arg(
            long,
            num_args = 4,
            allow_negative_numbers = true,
            value_names = ["MIN_X", "MIN_Y", "MAX_X", "MAX_Y"]
        )]
        region: Vec<f64>,
        /// Building footprints (path or http(s) URL)
        #[arg(long)]
        footprints: Option<GeoJsonSource>,
        /// Output GeoJSON file
        #[arg(short, long, default_value = "blue_roofs.geojson")]
        output: PathBuf,
    },
    /// Print the JSON schema of the analysis plan
    Schema,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Analyze { plan, output } => {
            analyze(plan, output.as_deref())?;
        }
        Commands::Detect { scenes, id, area, region, footprints, output } => {
            let area = area_label(area.as_deref(), scenes);
            detect(scenes, id, &area, region, footprints.as_ref(), output)?;
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&AnalysisPlan::schema())?);
        }
    }

    Ok(())
}

fn analyze(plan_path: &Path, output: Option<&Path>) -> Result<()> {
    let plan = AnalysisPlan::from_file(plan_path)?;
    std::fs::create_dir_all(&plan.output_dir)?;

    let detector = BlueRoofDetector::new(plan.detector_params())?;
    info!("{}", detector.info());
    let analyzer = AreaAnalyzer::with_detector(SceneDirectory::new(&plan.scenes_dir), detector);

    let mut results = ResultTable::new();
    for area in &plan.areas {
        info!("Analysing area '{}' ({} images)", area.name, area.image_ids.len());

        let footprints = match &area.footprints {
            Some(source) => Some(geojson::load(source)?.1),
            None => None,
        };

        let table = analyzer.analyze_with(
            &area.name,
            &area.region,
            &area.image_ids,
            footprints.as_deref(),
            |analysis| {
                let stem = format!("{}_{}", area.name, analysis.row.image_id);
                geojson::save(&analysis.features, plan.output_dir.join(format!("{stem}.geojson")))?;
                if let Some(footprints) = &footprints {
                    let buildings = flag_buildings(footprints, &analysis.features);
                    geojson::save(&buildings, plan.output_dir.join(format!("{stem}_buildings.geojson")))?;
                }
                Ok(())
            },
        )?;
        results.extend(table);
    }

    for row in results.iter() {
        info!("{} | {} | {} | {} blue roofs", row.date, row.area, row.image_id, row.count);
    }

    let output = output.map(Path::to_path_buf).unwrap_or_else(|| plan.output_dir.join("results.json"));
    std::fs::write(&output, results.to_json()?)?;
    info!("✅ Wrote {} rows to {}", results.len(), output.display());
    Ok(())
}

fn detect(
    scenes: &Path,
    image_id: &str,
    area: &str,
    region: &[f64],
    footprints: Option<&GeoJsonSource>,
    output: &Path,
) -> Result<()> {
    let &[min_x, min_y, max_x, max_y] = region else {
        bail!("--region takes exactly four values, got {}", region.len());
    };
    let region = Region::new(min_x, min_y, max_x, max_y);

    let analyzer = AreaAnalyzer::with_detector(
        SceneDirectory::new(scenes),
        BlueRoofDetector::new(DetectorParams::tuned())?,
    );
    let union = match footprints {
        Some(source) => Some(FootprintUnion::new(&geojson::load(source)?.1)),
        None => None,
    };

    let analysis = analyzer.analyze_image(area, &region, image_id, union.as_ref())?;
    geojson::save(&analysis.features, output)?;
    info!(
        "✅ {} blue roofs in {} / {} ({} pixels, {}) -> {}",
        analysis.row.count,
        analysis.row.area,
        image_id,
        analysis.correction,
        analysis.row.date,
        output.display()
    );
    Ok(())
}
