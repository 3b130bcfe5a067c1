// ============================================================================
// Masonry preview CLI — headless scene rendering via command-line arguments
// ============================================================================
//
// Usage examples:
//   masonry-preview --scene front.json --material stones/ledge.png -o front.png
//   masonry-preview -s scenes/*.json --material ledge.png --output-dir out/
//   masonry-preview -s front.json --material a.png --compare materials --material-b b.png
//   masonry-preview -s front.json --color roof=#4a4a4a --compare before-after --slider 40
//   masonry-preview -s upload.json --mask-file wall_mask.png --prompt "stone wall" --negative-prompt window
//
// Every scene is rendered synchronously; texture loads are waited for
// before the frame is written.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use crate::geometry::Point;
use crate::io::{self, encode_and_write, SaveFormat};
use crate::ops::compare::DEFAULT_SLIDER;
use crate::ops::lighting::LightingPreset;
use crate::ops::segmentation::{provider_for, MaskRequest, MaskSelection, StaticMaskBackend};
use crate::ops::text::load_label_font;
use crate::scene::{AreaType, Material, RegionRecord, SceneDocument};
use crate::session::{CompareSlot, Session};
use crate::settings::VisualizerSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Masonry preview headless renderer.
///
/// Apply stone materials and surface colours to scene presets and write the
/// composited result, or a before/after / A-B comparison, to disk.
#[derive(Parser, Debug)]
#[command(
    name = "masonry-preview",
    about = "Render stone and siding material previews onto house photos",
    long_about = "Render scene documents (house photo + mapped regions) with stone\n\
                  materials and surface colours applied, without a browser.\n\n\
                  Example:\n  \
                  masonry-preview --scene front.json --material ledge.png -o out.png\n  \
                  masonry-preview -s scenes/*.json --material ledge.png --output-dir out/"
)]
pub struct CliArgs {
    /// Scene document(s). Glob patterns accepted (e.g. "scenes/*.json").
    #[arg(short, long, required = true, num_args = 1..)]
    pub scene: Vec<String>,

    /// Stone material texture applied to every stone region.
    #[arg(short, long, value_name = "URL")]
    pub material: Option<String>,

    /// Display name of --material (used in labels and file names).
    #[arg(long, value_name = "NAME")]
    pub material_name: Option<String>,

    /// Colour an area type, e.g. `roof=#4a4a4a`. Repeatable.
    #[arg(long, value_name = "TYPE=COLOR")]
    pub color: Vec<String>,

    /// Tile a surface texture over an area type, e.g. `mantle=wood.png`. Repeatable.
    #[arg(long, value_name = "TYPE=URL")]
    pub texture: Vec<String>,

    /// Comparison mode: before-after, or materials (needs --material-b).
    #[arg(long, value_name = "MODE")]
    pub compare: Option<String>,

    /// Right-hand material for `--compare materials`.
    #[arg(long, value_name = "URL")]
    pub material_b: Option<String>,

    #[arg(long, value_name = "NAME")]
    pub material_b_name: Option<String>,

    /// Comparison split position in percent (0–100).
    #[arg(long, default_value_t = DEFAULT_SLIDER, value_name = "0-100")]
    pub slider: f32,

    /// Lighting preset: daylight or evening.
    #[arg(long, value_name = "PRESET")]
    pub lighting: Option<String>,

    /// Pre-generated segmentation mask(s) merged into an extra mask region.
    #[arg(long, value_name = "FILE", num_args = 1..)]
    pub mask_file: Vec<String>,

    /// Text prompt describing the surface to segment.
    #[arg(long, value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Text describing what the prompt must not select.
    #[arg(long, value_name = "TEXT")]
    pub negative_prompt: Option<String>,

    /// Positive click point `x,y` in photo pixels. Repeatable.
    #[arg(long, value_name = "X,Y")]
    pub click: Vec<String>,

    /// Negative click point `x,y` in photo pixels. Repeatable.
    #[arg(long, value_name = "X,Y")]
    pub negative_click: Vec<String>,

    /// Output file path. Only valid for a single scene.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch rendering.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, tga, tiff.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG / WEBP quality (1–100). Defaults to the configured quality.
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// System font family for comparison labels.
    #[arg(long, value_name = "FAMILY")]
    pub font: Option<String>,

    /// Settings file to use instead of the per-user one.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Mirror log output to stderr and print per-scene timing.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompareMode {
    BeforeAfter,
    Materials,
}

/// Everything the per-scene pipeline needs, parsed once.
struct Job {
    settings: VisualizerSettings,
    material: Option<Material>,
    material_b: Option<Material>,
    colors: Vec<(AreaType, String)>,
    textures: Vec<(AreaType, String)>,
    compare: Option<CompareMode>,
    slider: f32,
    lighting: LightingPreset,
    masks: Vec<String>,
    mask_request: MaskRequest,
    format: SaveFormat,
    quality: u8,
    font_family: Option<String>,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all scenes succeeded, `1` = one or more scenes failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.scene);
    if inputs.is_empty() {
        eprintln!("error: no scene files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} scene files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch rendering.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let job = match build_job(&args) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let start = Instant::now();

        match run_one(input_path, &job, args.output.as_deref(), args.output_dir.as_deref()) {
            Ok(written) => {
                if args.verbose || multi {
                    println!("  → {} ({:.0}ms)", written.display(), start.elapsed().as_secs_f64() * 1000.0);
                }
            }
            Err(e) => {
                log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn build_job(args: &CliArgs) -> Result<Job, String> {
    let settings = match &args.settings {
        Some(path) => VisualizerSettings::load_from(path),
        None => VisualizerSettings::load(),
    };

    let material = args
        .material
        .as_deref()
        .map(|url| material_from(url, args.material_name.as_deref()));
    let material_b = args
        .material_b
        .as_deref()
        .map(|url| material_from(url, args.material_b_name.as_deref()));

    let compare = match args.compare.as_deref().map(str::to_lowercase).as_deref() {
        None => None,
        Some("before-after" | "before_after" | "beforeafter") => Some(CompareMode::BeforeAfter),
        Some("materials" | "ab" | "a-b") => Some(CompareMode::Materials),
        Some(other) => return Err(format!("unknown comparison mode '{}'", other)),
    };
    if compare == Some(CompareMode::Materials) && (material.is_none() || material_b.is_none()) {
        return Err("--compare materials needs both --material and --material-b".to_string());
    }

    let lighting = match args.lighting.as_deref() {
        None => LightingPreset::default(),
        Some(s) => LightingPreset::parse(s).ok_or_else(|| format!("unknown lighting preset '{}'", s))?,
    };

    let colors = args.color.iter().map(|s| parse_assignment(s)).collect::<Result<Vec<_>, _>>()?;
    let textures = args
        .texture
        .iter()
        .map(|s| parse_assignment(s).map(|(t, url)| (t, absolutize(&url))))
        .collect::<Result<Vec<_>, _>>()?;

    let positive_points = args.click.iter().map(|s| parse_point(s)).collect::<Result<Vec<_>, _>>()?;
    let negative_points = args.negative_click.iter().map(|s| parse_point(s)).collect::<Result<Vec<_>, _>>()?;
    let mask_request = MaskRequest {
        prompt: args.prompt.clone().unwrap_or_default(),
        negative_prompt: args.negative_prompt.clone(),
        positive_points,
        negative_points,
    };

    let format = parse_format(args.format.as_deref(), args.output.as_deref());
    let quality = args.quality.unwrap_or(settings.jpeg_quality).clamp(1, 100);
    let font_family = args.font.clone().or_else(|| settings.label_font().map(str::to_string));

    Ok(Job {
        settings,
        material,
        material_b,
        colors,
        textures,
        compare,
        slider: args.slider,
        lighting,
        masks: args.mask_file.iter().map(|m| absolutize(m)).collect(),
        mask_request,
        format,
        quality,
        font_family,
    })
}

// ============================================================================
// Per-scene pipeline
// ============================================================================

fn run_one(input: &Path, job: &Job, output: Option<&Path>, output_dir: Option<&Path>) -> Result<PathBuf, String> {
    // -- Step 1: Load ----------------------------------------------------
    let mut doc = io::load_scene_document(input).map_err(|e| e.to_string())?;
    let base_dir = input.parent().unwrap_or(Path::new(".")).to_path_buf();
    if !job.masks.is_empty() {
        add_segmented_region(&mut doc, job, &base_dir)?;
    }

    let mut session = Session::with_base_dir(job.settings.clone(), &base_dir);
    session.load_scene(doc).map_err(|e| e.to_string())?;
    session.set_lighting(job.lighting);

    // -- Step 2: Customize -------------------------------------------------
    for (area_type, color) in &job.colors {
        session.apply_color_to_area(*area_type, color).map_err(|e| e.to_string())?;
    }
    for (area_type, url) in &job.textures {
        session.apply_texture_to_area(*area_type, url, None).map_err(|e| e.to_string())?;
    }
    if let Some(m) = &job.material {
        session.choose_material(m.clone()).map_err(|e| e.to_string())?;
    }

    // -- Step 3: Render ----------------------------------------------------
    let image = match job.compare {
        None => {
            let (image, report) = session.render_display().ok_or("no scene loaded")?;
            for (id, reason) in &report.skipped {
                log_info!("Region '{}' not drawn: {:?}", id, reason);
            }
            image
        }
        Some(mode) => {
            if mode == CompareMode::Materials
                && let (Some(a), Some(b)) = (&job.material, &job.material_b)
            {
                let a_index = session.save_material(a.clone());
                let b_index = session.save_material(b.clone());
                session.assign_compare_slot(CompareSlot::A, a_index).map_err(|e| e.to_string())?;
                session.assign_compare_slot(CompareSlot::B, b_index).map_err(|e| e.to_string())?;
                session.start_material_comparison().map_err(|e| e.to_string())?;
            } else {
                session.start_before_after().map_err(|e| e.to_string())?;
            }
            session.set_slider(job.slider);
            let font = load_label_font(job.font_family.as_deref());
            session.export_comparison(font.as_ref()).ok_or("comparison was not started")?
        }
    };

    // -- Step 4: Save ------------------------------------------------------
    let path = match (output, job.compare, output_dir) {
        (Some(out), _, _) => out.to_path_buf(),
        (None, Some(_), Some(dir)) => {
            let name = session.comparison_filename().unwrap_or_else(|| "comparison.png".to_string());
            dir.join(name).with_extension(job.format.extension())
        }
        (None, _, _) => build_output_path(input, output_dir, job.format)
            .ok_or_else(|| format!("cannot determine output path for '{}'", input.display()))?,
    };
    encode_and_write(&image, &path, job.format, job.quality).map_err(|e| format!("save failed: {}", e))?;
    Ok(path)
}

/// Merge the supplied masks (through the configured segmentation strategy)
/// into one selection and append it to `doc` as a mask region.
fn add_segmented_region(doc: &mut SceneDocument, job: &Job, base_dir: &Path) -> Result<(), String> {
    let photo = io::load_image_source(&doc.house, base_dir).map_err(|e| format!("house photo: {}", e))?;
    let backend = StaticMaskBackend::from_sources(&job.masks, base_dir).map_err(|e| e.to_string())?;
    let provider = provider_for(job.settings.mask_strategy, Arc::new(backend), job.mask_request.clone());
    let masks = provider.masks(&photo).map_err(|e| e.to_string())?;

    let mut selection = MaskSelection::new(photo.width(), photo.height());
    for (i, mask) in masks.iter().enumerate() {
        selection.snapshot();
        selection.add_mask(mask, &format!("mask {}", i + 1));
    }
    if selection.is_empty() {
        return Err("segmentation selected no pixels".to_string());
    }

    let source = io::encode_png_data_url(&selection.to_mask_image()).map_err(|e| e.to_string())?;
    let index = doc.areas.len();
    doc.areas.push(RegionRecord {
        id: format!("custom-area-{}", index),
        name: Some(format!("Wall {}", index + 1)),
        use_mask: true,
        mask: Some(source),
        ..Default::default()
    });
    log_info!("Added segmented region from {} mask(s), {} px selected", masks.len(), selection.selected_count());
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn material_from(url: &str, name: Option<&str>) -> Material {
    let name = name.map(str::to_string).unwrap_or_else(|| {
        Path::new(url)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    Material::new(absolutize(url), name)
}

/// Local files named on the command line are relative to the working
/// directory, not to the scene document.
fn absolutize(source: &str) -> String {
    if source.starts_with("data:") || source.contains("://") {
        return source.to_string();
    }
    match std::fs::canonicalize(source) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => source.to_string(),
    }
}

/// `type=value` with a known area type.
fn parse_assignment(s: &str) -> Result<(AreaType, String), String> {
    let (key, value) = s.split_once('=').ok_or_else(|| format!("expected TYPE=VALUE, got '{}'", s))?;
    let area_type = AreaType::parse(key).ok_or_else(|| format!("unknown area type '{}'", key.trim()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("missing value for '{}'", key.trim()));
    }
    Ok((area_type, value.to_string()))
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s.split_once(',').ok_or_else(|| format!("expected X,Y, got '{}'", s))?;
    let x = x.trim().parse::<f32>().map_err(|_| format!("bad x in '{}'", s))?;
    let y = y.trim().parse::<f32>().map_err(|_| format!("bad y in '{}'", s))?;
    Ok(Point::new(x, y))
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    if let Some(f) = format_arg {
        return SaveFormat::from_extension(f).unwrap_or_default();
    }
    output.map(SaveFormat::for_path).unwrap_or_default()
}

/// Output path for a scene rendered without an explicit `--output`:
/// the scene's stem in `--output-dir`, else next to the scene document.
fn build_output_path(input: &Path, output_dir: Option<&Path>, format: SaveFormat) -> Option<PathBuf> {
    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_need_known_area_types() {
        assert_eq!(parse_assignment("roof=#123456").unwrap(), (AreaType::Roof, "#123456".to_string()));
        assert_eq!(parse_assignment(" Trim = white ").unwrap(), (AreaType::Trim, "white".to_string()));
        assert!(parse_assignment("garage=#fff").is_err());
        assert!(parse_assignment("roof=").is_err());
        assert!(parse_assignment("roof").is_err());
    }

    #[test]
    fn format_from_flag_then_extension() {
        assert_eq!(parse_format(Some("JPEG"), None), SaveFormat::Jpeg);
        assert_eq!(parse_format(None, Some(Path::new("out.webp"))), SaveFormat::Webp);
        assert_eq!(parse_format(None, None), SaveFormat::Png);
    }

    #[test]
    fn output_path_avoids_overwriting_input() {
        let p = build_output_path(Path::new("scenes/front.png"), None, SaveFormat::Png).unwrap();
        assert_eq!(p, PathBuf::from("scenes/front_out.png"));
        let p = build_output_path(Path::new("scenes/front.json"), Some(Path::new("out")), SaveFormat::Jpeg).unwrap();
        assert_eq!(p, PathBuf::from("out/front.jpg"));
    }

    #[test]
    fn args_parse() {
        let args = CliArgs::try_parse_from([
            "masonry-preview",
            "--scene",
            "a.json",
            "--color",
            "roof=#333",
            "--compare",
            "before-after",
            "--slider",
            "30",
        ])
        .unwrap();
        assert_eq!(args.scene, vec!["a.json".to_string()]);
        assert_eq!(args.slider, 30.0);
        let job = build_job(&args).unwrap();
        assert_eq!(job.compare, Some(CompareMode::BeforeAfter));
        assert_eq!(job.colors, vec![(AreaType::Roof, "#333".to_string())]);
        assert_eq!(parse_point("3, 4.5").unwrap(), Point::new(3.0, 4.5));
    }

    #[test]
    fn negative_hints_reach_the_mask_request() {
        let args = CliArgs::try_parse_from([
            "masonry-preview",
            "--scene",
            "a.json",
            "--prompt",
            "brick wall",
            "--negative-prompt",
            "window",
            "--click",
            "10,20",
            "--negative-click",
            "5,6",
            "--negative-click",
            "7,8",
        ])
        .unwrap();
        let job = build_job(&args).unwrap();
        let req = &job.mask_request;
        assert_eq!(req.prompt, "brick wall");
        assert_eq!(req.negative_prompt.as_deref(), Some("window"));
        assert_eq!(req.positive_points, vec![Point::new(10.0, 20.0)]);
        assert_eq!(req.negative_points, vec![Point::new(5.0, 6.0), Point::new(7.0, 8.0)]);

        let bad = CliArgs::try_parse_from(["masonry-preview", "-s", "a.json", "--negative-click", "oops"]).unwrap();
        assert!(build_job(&bad).is_err());
    }
}
