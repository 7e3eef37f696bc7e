use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3};

use retro3d_runtime::geometry::{calc_bounding_box, make_quad_mesh};
use retro3d_runtime::{
    load_skeleton_file, read_playfield, EngineConfig, FourCC, FractureParams, GeometrySource,
    Playfield, ResourceFork, ShardMode, ShardPool, SkeletonDefinition, TerrainHeight,
};

const TICK_SECONDS: f32 = 1.0 / 60.0;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let mut config = EngineConfig::from_env();
    if options.ceiling {
        config.playfield.load_ceiling = true;
    }

    match FileKind::detect(&options.path)? {
        FileKind::Skeleton => {
            let reference = options
                .reference
                .clone()
                .unwrap_or_else(|| options.path.with_extension("obj"));
            let skeleton = load_skeleton_file(&options.path, &reference)?;
            print_skeleton(&skeleton, options.summary_only);
            if let Some(density) = options.explode {
                let mut meshes = skeleton.reference.clone_meshes();
                skeleton.deform(&skeleton.bind_pose_matrices(), &mut meshes);
                let mut pool = ShardPool::new(config.shards.clone());
                let created =
                    pool.explode_geometry(&meshes, GeometrySource::Skinned, &fracture(density));
                simulate(&mut pool, created, options.ticks, None);
            }
        }
        FileKind::Playfield => {
            let fork = ResourceFork::open(&options.path)
                .with_context(|| format!("failed to open playfield {}", options.path.display()))?;
            let playfield = read_playfield(&fork, &config.playfield)
                .with_context(|| format!("failed to read playfield {}", options.path.display()))?;
            print_playfield(&playfield, options.summary_only);
            if let Some(density) = options.explode {
                let centre = Vec3::new(playfield.unit_width * 0.5, 0.0, playfield.unit_depth * 0.5);
                let ground = playfield.height_at(centre.x, centre.z).unwrap_or(0.0);
                let placement = Mat4::from_translation(centre + Vec3::Y * (ground + 200.0))
                    * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
                let debris = make_quad_mesh(4, 100.0, 100.0)?;
                let mut pool = ShardPool::new(config.shards.clone());
                let created = pool.explode_geometry(
                    &[debris],
                    GeometrySource::Static(placement),
                    &fracture(density),
                );
                simulate(&mut pool, created, options.ticks, Some(&playfield));
            }
        }
    }
    Ok(())
}

fn fracture(density: usize) -> FractureParams {
    FractureParams {
        force: 400.0,
        mode: ShardMode::BOUNCE | ShardMode::UPTHRUST,
        density,
        decay_speed: 0.5,
    }
}

fn simulate(pool: &mut ShardPool, created: usize, ticks: u32, terrain: Option<&dyn TerrainHeight>) {
    println!("Exploded into {created} shard(s)");
    for _ in 0..ticks {
        pool.tick(TICK_SECONDS, terrain);
    }
    if ticks > 0 {
        println!(
            "After {ticks} tick(s): {} shard(s) active",
            pool.active_count()
        );
    }
}

fn print_skeleton(skeleton: &SkeletonDefinition, summary_only: bool) {
    println!(
        "Loaded skeleton with {} bones, {} animations",
        skeleton.num_bones(),
        skeleton.num_anims()
    );
    if summary_only {
        return;
    }
    for bone in &skeleton.bones {
        match bone.parent_bone {
            Some(parent) => println!(
                " - bone {} (parent {}, {} points)",
                bone.name,
                skeleton.bones[parent].name,
                bone.point_list.len()
            ),
            None => println!(" - bone {} (root, {} points)", bone.name, bone.point_list.len()),
        }
    }
    for (a, anim) in skeleton.animations.iter().enumerate() {
        println!(
            " - anim {}: {} event(s), {} tick(s)",
            anim.name,
            anim.events.len(),
            skeleton.animation_length(a)
        );
    }
    let bbox = calc_bounding_box(&skeleton.reference.meshes);
    if !bbox.is_empty {
        println!(
            "Reference bounds ({:.2}, {:.2}, {:.2}) .. ({:.2}, {:.2}, {:.2})",
            bbox.min.x, bbox.min.y, bbox.min.z, bbox.max.x, bbox.max.y, bbox.max.z
        );
    }
}

fn print_playfield(playfield: &Playfield, summary_only: bool) {
    println!(
        "Loaded playfield {}x{} tiles ({} items, {} splines, {} fences)",
        playfield.tile_width,
        playfield.tile_depth,
        playfield.items.len(),
        playfield.splines.len(),
        playfield.fences.len()
    );
    if summary_only {
        return;
    }
    println!(
        " - {} layer(s), {} tile image word(s), height range {:.1} .. {:.1}",
        playfield.num_layers(),
        playfield.tile_images.len(),
        playfield.header.min_y,
        playfield.header.max_y
    );
    for (i, spline) in playfield.splines.iter().enumerate() {
        println!(
            " - spline {i}: {} point(s), {} item(s)",
            spline.points.len(),
            spline.items.len()
        );
    }
    for (i, fence) in playfield.fences.iter().enumerate() {
        println!(" - fence {i}: type {}, {} nub(s)", fence.fence_type, fence.nubs.len());
    }
}

enum FileKind {
    Skeleton,
    Playfield,
}

impl FileKind {
    fn detect(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("skeleton") => Ok(FileKind::Skeleton),
            Some(ext) if ext.eq_ignore_ascii_case("ter") => Ok(FileKind::Playfield),
            _ => {
                let fork = ResourceFork::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                if fork.contains(FourCC::new(b"Bone"), 1000) {
                    Ok(FileKind::Skeleton)
                } else {
                    Ok(FileKind::Playfield)
                }
            }
        }
    }
}

struct CliOptions {
    path: PathBuf,
    ceiling: bool,
    reference: Option<PathBuf>,
    explode: Option<usize>,
    ticks: u32,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: retro3d-runtime <file.skeleton|file.ter> [--ceiling] [--reference model.obj] [--explode DENSITY] [--ticks N] [--summary-only]"
            ));
        };
        let mut options = Self {
            path: PathBuf::from(path),
            ceiling: false,
            reference: None,
            explode: None,
            ticks: 0,
            summary_only: false,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--ceiling" => options.ceiling = true,
                "--summary-only" => options.summary_only = true,
                "--reference" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--reference requires a path"))?;
                    options.reference = Some(PathBuf::from(value));
                }
                "--explode" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--explode requires a density"))?;
                    let density = value
                        .parse()
                        .with_context(|| format!("invalid shard density {value}"))?;
                    options.explode = Some(density);
                }
                "--ticks" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--ticks requires a count"))?;
                    options.ticks = value
                        .parse()
                        .with_context(|| format!("invalid tick count {value}"))?;
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --ceiling, --reference, --explode, --ticks or --summary-only"
                    ));
                }
            }
        }
        Ok(options)
    }
}
