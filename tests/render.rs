use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use image::{Rgba, RgbaImage};

use masonrypreview::compositor::Compositor;
use masonrypreview::geometry::Point;
use masonrypreview::io::LoadError;
use masonrypreview::ops::tiles::{tile_count, ScaleCalibration};
use masonrypreview::scene::{
    AreaType, DepthEdge, Material, Region, Scene, SceneDocument, StoneAssignment, Surface, TextureMode,
};
use masonrypreview::session::Session;
use masonrypreview::settings::VisualizerSettings;
use masonrypreview::textures::{TextureCache, TextureLoader};

const HOUSE: Rgba<u8> = Rgba([90, 110, 130, 255]);
const STONE: Rgba<u8> = Rgba([200, 50, 50, 255]);

struct MapLoader(HashMap<String, RgbaImage>);

impl TextureLoader for MapLoader {
    fn load(&self, source: &str) -> Result<RgbaImage, LoadError> {
        self.0.get(source).cloned().ok_or_else(|| LoadError::Unsupported(source.to_string()))
    }
}

fn loader(entries: Vec<(&str, RgbaImage)>) -> Arc<MapLoader> {
    Arc::new(MapLoader(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()))
}

fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Point> {
    vec![Point::new(x0, y0), Point::new(x1, y0), Point::new(x1, y1), Point::new(x0, y1)]
}

fn stone_wall(id: &str, points: Vec<Point>) -> Region {
    Region::polygon(id, points).with_surface(Surface {
        stone: Some(StoneAssignment { url: "stone".into(), ..Default::default() }),
        ..Default::default()
    })
}

fn colored(id: &str, t: AreaType, color: &str, points: Vec<Point>) -> Region {
    Region::polygon(id, points).with_surface(Surface {
        area_type: Some(t),
        texture_mode: Some(TextureMode::ColorFill),
        fill_color: Some(color.into()),
        ..Default::default()
    })
}

fn house_scene(w: u32, h: u32, regions: Vec<Region>) -> Scene {
    Scene::new(RgbaImage::from_pixel(w, h, HOUSE), w, h).with_regions(regions)
}

fn ready_cache() -> TextureCache {
    let cache = TextureCache::new(loader(vec![]));
    cache.insert("stone", RgbaImage::from_pixel(4, 4, STONE));
    cache
}

#[test]
fn rendering_is_idempotent() {
    let mut scene = house_scene(
        100,
        60,
        vec![
            stone_wall("wall", rect(0.0, 0.0, 100.0, 60.0)),
            Region::cutout("window", rect(20.0, 10.0, 40.0, 30.0)),
            colored("roof", AreaType::Roof, "rgba(20, 20, 20, 0.5)", rect(0.0, 0.0, 100.0, 8.0)),
        ],
    );
    scene.depth_edges.push(DepthEdge { points: vec![Point::new(10.0, 50.0), Point::new(90.0, 50.0)], ..Default::default() });
    let modified: HashSet<AreaType> = [AreaType::Roof].into_iter().collect();
    let textures = ready_cache();
    let mut comp = Compositor::default();

    let (first, report) = comp.render(&scene, &modified, &textures);
    let (second, _) = comp.render(&scene, &modified, &textures);
    assert_eq!(first, second);
    assert!(report.pending.is_empty());
    assert!(report.skipped.is_empty());
}

#[test]
fn area_type_priority_beats_document_order() {
    let scene = house_scene(
        100,
        60,
        vec![
            colored("trim", AreaType::Trim, "#00ff00", rect(0.0, 0.0, 50.0, 30.0)),
            colored("roof", AreaType::Roof, "#ff0000", rect(0.0, 0.0, 50.0, 30.0)),
        ],
    );
    let modified: HashSet<AreaType> = [AreaType::Roof, AreaType::Trim].into_iter().collect();
    let (img, report) = Compositor::default().render(&scene, &modified, &ready_cache());
    assert_eq!(report.drawn, 2);
    assert_eq!(*img.get_pixel(10, 10), Rgba([0, 255, 0, 255]));
    assert_eq!(*img.get_pixel(70, 10), HOUSE);
}

#[test]
fn stone_draws_over_siding() {
    let scene = house_scene(
        100,
        60,
        vec![
            stone_wall("wall", rect(0.0, 0.0, 60.0, 60.0)),
            colored("siding", AreaType::Siding, "#0000ff", rect(40.0, 0.0, 100.0, 60.0)),
        ],
    );
    let modified: HashSet<AreaType> = [AreaType::Siding].into_iter().collect();
    let (img, _) = Compositor::default().render(&scene, &modified, &ready_cache());
    assert_eq!(*img.get_pixel(50, 30), STONE);
    assert_ne!(*img.get_pixel(80, 30), HOUSE);
}

#[test]
fn cutouts_restore_photo_and_sills_survive() {
    let scene = house_scene(
        100,
        60,
        vec![
            stone_wall("wall", rect(0.0, 0.0, 100.0, 60.0)),
            Region::cutout("window", rect(20.0, 10.0, 60.0, 40.0)),
            colored("sill", AreaType::Sills, "#ffffff", rect(20.0, 35.0, 60.0, 40.0)),
        ],
    );
    // sills draw even though nothing is modified
    let (img, _) = Compositor::default().render(&scene, &HashSet::new(), &ready_cache());
    assert_eq!(*img.get_pixel(5, 5), STONE);
    assert_eq!(*img.get_pixel(30, 20), HOUSE);
    assert_eq!(*img.get_pixel(30, 37), Rgba([255, 255, 255, 255]));
    assert_eq!(*img.get_pixel(70, 37), STONE);
}

#[test]
fn non_ascii_fill_color_draws_nothing() {
    let scene = house_scene(
        100,
        60,
        vec![
            colored("roof", AreaType::Roof, "#ää", rect(0.0, 0.0, 100.0, 30.0)),
            stone_wall("wall", rect(0.0, 30.0, 100.0, 60.0)),
        ],
    );
    let modified: HashSet<AreaType> = [AreaType::Roof].into_iter().collect();
    let (img, report) = Compositor::default().render(&scene, &modified, &ready_cache());
    assert_eq!(*img.get_pixel(50, 10), HOUSE);
    assert_eq!(*img.get_pixel(50, 45), STONE);
    assert_eq!(report.drawn, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "roof");
}

#[test]
fn unmodified_surfaces_are_invisible() {
    let scene = house_scene(
        100,
        60,
        vec![
            colored("roof", AreaType::Roof, "#123456", rect(0.0, 0.0, 100.0, 30.0)),
            Region::polygon("mantle", rect(0.0, 30.0, 100.0, 60.0)).with_surface(Surface {
                area_type: Some(AreaType::Mantle),
                texture_mode: Some(TextureMode::TextureFill),
                texture_url: Some("stone".into()),
                ..Default::default()
            }),
        ],
    );
    let textures = ready_cache();
    let mut comp = Compositor::default();
    let (img, report) = comp.render(&scene, &HashSet::new(), &textures);
    assert!(img.pixels().all(|p| *p == HOUSE));
    assert_eq!(report.drawn, 0);

    let modified: HashSet<AreaType> = [AreaType::Roof].into_iter().collect();
    let (img, _) = comp.render(&scene, &modified, &textures);
    assert_eq!(*img.get_pixel(50, 10), Rgba([0x12, 0x34, 0x56, 255]));
    assert_eq!(*img.get_pixel(50, 45), HOUSE);
}

#[test]
fn default_stone_scale_gives_345px_tiles() {
    let calib = ScaleCalibration::default();
    let texture = RgbaImage::new(1000, 1000);
    let tile = calib.tile_for(&texture, calib.stone_factor(None));
    assert!((tile.width - 345.0).abs() < 1e-2);
    assert!((tile.height - 345.0).abs() < 1e-2);
    assert_eq!(tile_count(1600.0, tile.width), 5);
    assert_eq!(tile_count(960.0, tile.height), 3);

    // a half-resolution texture normalizes to the same footprint
    let small = calib.tile_for(&RgbaImage::new(500, 250), calib.stone_factor(Some(200.0)));
    assert!((small.width - 345.0).abs() < 1e-2);
    assert!((small.height - 172.5).abs() < 1e-2);
}

#[test]
fn full_canvas_stone_repeats_ceil_width_over_tile() {
    // first texture row and column mark the tile seams
    let seam = Rgba([255, 0, 0, 255]);
    let mut texture = RgbaImage::from_pixel(10, 10, Rgba([0, 160, 0, 255]));
    for i in 0..10 {
        texture.put_pixel(0, i, seam);
        texture.put_pixel(i, 0, seam);
    }
    let textures = TextureCache::new(loader(vec![]));
    textures.insert("stone", texture);
    let scene = house_scene(1600, 960, vec![stone_wall("wall", rect(0.0, 0.0, 1600.0, 960.0))]);

    let (img, report) = Compositor::default().render(&scene, &HashSet::new(), &textures);
    assert_eq!(report.drawn, 1);

    let seams_along = |len: u32, px: &dyn Fn(u32) -> Rgba<u8>| {
        (0..len).filter(|&i| px(i) == seam && (i == 0 || px(i - 1) != seam)).count() as u32
    };
    let across = seams_along(1600, &|x| *img.get_pixel(x, 480));
    let down = seams_along(960, &|y| *img.get_pixel(100, y));
    assert_eq!(across, tile_count(1600.0, 345.0));
    assert_eq!(across, 5);
    assert_eq!(down, tile_count(960.0, 345.0));
    assert_eq!(down, 3);
}

#[test]
fn mask_region_follows_the_mask() {
    let mut mask = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
    for y in 0..100 {
        for x in 0..50 {
            mask.put_pixel(x, y, Rgba([255, 255, 255, 255]));
        }
    }
    let tex = Rgba([10, 200, 10, 255]);
    let mut session = Session::new(
        VisualizerSettings::default(),
        loader(vec![("mask.png", mask), ("tex.png", RgbaImage::from_pixel(10, 10, tex))]),
    );
    session.set_scene(house_scene(
        100,
        100,
        vec![Region::masked("custom-area-0", "mask.png").with_surface(Surface {
            stone: Some(StoneAssignment { url: "tex.png".into(), ..Default::default() }),
            ..Default::default()
        })],
    ));

    let (img, report) = session.render_settled().unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(*img.get_pixel(10, 50), tex);
    assert_eq!(*img.get_pixel(49, 99), tex);
    assert_eq!(*img.get_pixel(60, 50), HOUSE);
}

#[test]
fn missing_mask_skips_only_that_region() {
    let mut session = Session::new(
        VisualizerSettings::default(),
        loader(vec![("tex.png", RgbaImage::from_pixel(10, 10, STONE))]),
    );
    session.set_scene(house_scene(
        100,
        60,
        vec![
            Region::masked("broken", "nowhere.png").with_surface(Surface {
                stone: Some(StoneAssignment { url: "tex.png".into(), ..Default::default() }),
                ..Default::default()
            }),
            Region::polygon("wall", rect(0.0, 0.0, 50.0, 60.0)).with_surface(Surface {
                stone: Some(StoneAssignment { url: "tex.png".into(), ..Default::default() }),
                ..Default::default()
            }),
        ],
    ));
    let (img, report) = session.render_settled().unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "broken");
    assert_eq!(*img.get_pixel(10, 10), STONE);
    assert_eq!(*img.get_pixel(80, 10), HOUSE);
}

#[test]
fn scene_document_end_to_end() {
    let json = r##"{
        "house": "house.png",
        "name": "Front Elevation",
        "areas": [
            { "id": "wall", "points": [{"x":0,"y":20},{"x":200,"y":20},{"x":200,"y":120},{"x":0,"y":120}],
              "cutouts": ["window"] },
            { "id": "window", "isCutout": true,
              "points": [{"x":20,"y":20},{"x":60,"y":20},{"x":60,"y":60},{"x":20,"y":60}] },
            { "id": "roof", "areaType": "roof", "textureMode": "color_fill", "fillColor": "#333333",
              "points": [{"x":100,"y":0},{"x":200,"y":0},{"x":200,"y":20},{"x":100,"y":20}] }
        ]
    }"##;
    let ledge = Rgba([180, 150, 120, 255]);
    let mut settings = VisualizerSettings::default();
    settings.canvas_long_edge = 200;
    settings.canvas_short_edge = 120;
    let mut session = Session::new(
        settings,
        loader(vec![
            ("house.png", RgbaImage::from_pixel(400, 240, HOUSE)),
            ("ledge.png", RgbaImage::from_pixel(16, 16, ledge)),
        ]),
    );

    session.load_scene(SceneDocument::from_json(json).unwrap()).unwrap();
    let scene = session.scene().unwrap();
    assert_eq!((scene.canvas_width, scene.canvas_height), (200, 120));

    // only the wall takes the stone: the roof is a colour fill, the window a cutout
    assert_eq!(session.apply_material_to_all(&Material::new("ledge.png", "Ledge")).unwrap(), 1);
    let (img, _) = session.render_settled().unwrap();
    assert_eq!(*img.get_pixel(5, 100), ledge);
    assert_eq!(*img.get_pixel(40, 40), HOUSE);
    assert_eq!(*img.get_pixel(150, 10), HOUSE);

    assert!(session.apply_color_to_area(AreaType::Roof, "#333333").unwrap());
    let (img, _) = session.render_settled().unwrap();
    let roof = *img.get_pixel(150, 10);
    assert_ne!(roof, HOUSE);
    assert!(roof[0] < HOUSE[0]);

    let doc = session.to_document().unwrap();
    assert_eq!(doc.areas.len(), 3);
    assert_eq!(doc.areas[2].material_opacity, Some(0.6));
}
