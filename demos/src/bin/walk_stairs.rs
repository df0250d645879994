//! Headless leg IK walk over stairs or bumpy ground.
//!
//! Moves a biped (or quadruped) align forward through synthetic terrain with
//! a latent probe service, then stops and holds its feet. Prints the root
//! delta and ankle heights every few frames.
//!
//! ```text
//! RUST_LOG=strider_ik=debug cargo run -p strider-demos --bin walk_stairs -- --step-height 0.18
//! ```

use clap::{Parser, ValueEnum};
use nalgebra::{Isometry3, Point3, Vector3};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strider_core::config::LegIkConfig;
use strider_core::error::StriderError;
use strider_core::types::{FrameNumber, IkMode};
use strider_ground::terrain::{GroundSample, GroundSampler, HeightField, LatentProbeService};
use strider_ik::chain::LegJointNames;
use strider_ik::{FrameInput, LegIkController, SkeletonPose};
use strider_test_utils::rng::bumpy_heights;
use strider_test_utils::{biped_skeleton, quadruped_skeleton};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Terrain {
    /// A flight of stairs starting at z = 1.
    Stairs,
    /// Random rolling ground.
    Bumpy,
}

/// Walk a leg IK rig over synthetic terrain.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[arg(long, value_enum, default_value_t = Terrain::Stairs)]
    terrain: Terrain,

    /// Frames spent walking.
    #[arg(short, long, default_value_t = 300)]
    frames: u32,

    /// Frames spent standing still after the walk.
    #[arg(long, default_value_t = 60)]
    stop_frames: u32,

    /// Walking speed in m/s.
    #[arg(long, default_value_t = 1.2)]
    speed: f32,

    /// Rise of each stair.
    #[arg(long, default_value_t = 0.15)]
    step_height: f32,

    /// Depth of each stair.
    #[arg(long, default_value_t = 0.3)]
    step_depth: f32,

    /// Number of stairs.
    #[arg(long, default_value_t = 8)]
    steps: u32,

    /// Maximum height change between bumpy ground rows.
    #[arg(long, default_value_t = 0.04)]
    bump: f32,

    /// Seed for bumpy ground.
    #[arg(short, long, default_value_t = 7)]
    seed: u64,

    /// Probe polls before a batch completes.
    #[arg(long, default_value_t = 2)]
    latency: u32,

    /// Use the four-legged rig.
    #[arg(long)]
    quadruped: bool,

    /// Print every N frames.
    #[arg(long, default_value_t = 10)]
    every: u32,

    /// Leg IK configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

// ---------------------------------------------------------------------------
// Terrain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Stairs {
    start_z: f32,
    rise: f32,
    depth: f32,
    count: u32,
}

impl GroundSampler for Stairs {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn sample(&self, _x: f32, z: f32) -> Option<GroundSample> {
        let step = if z < self.start_z {
            0
        } else {
            (((z - self.start_z) / self.depth).floor() as u32 + 1).min(self.count)
        };
        Some(GroundSample {
            height: step as f32 * self.rise,
            normal: Vector3::y(),
        })
    }
}

/// Rows of bumpy heights along Z, constant across X.
fn bumpy_field(length: f32, bump: f32, seed: u64) -> Option<HeightField> {
    const CELL: f32 = 0.25;
    const COLUMNS: usize = 9;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rows = ((length + 4.0) / CELL).ceil() as usize + 1;
    let heights = bumpy_heights(rows, bump, seed)
        .into_iter()
        .flat_map(|h| std::iter::repeat_n(h, COLUMNS))
        .collect();
    HeightField::new(Point3::new(-1.0, 0.0, -2.0), CELL, COLUMNS, rows, heights)
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

struct Rig {
    skeleton: SkeletonPose,
    controller: LegIkController,
}

fn build_rig(config: LegIkConfig, quadruped: bool) -> Result<Rig, StriderError> {
    let (skeleton, names) = if quadruped {
        (quadruped_skeleton(), LegJointNames::horse())
    } else {
        (biped_skeleton(), LegJointNames::human())
    };
    let controller = LegIkController::from_skeleton(config, &names, &skeleton)?;
    Ok(Rig { skeleton, controller })
}

#[allow(clippy::cast_precision_loss)]
fn walk<S: GroundSampler>(cli: &Cli, rig: &mut Rig, terrain: S) {
    let dt = rig.controller.config().controller.fixed_dt;
    let mut service = LatentProbeService::new(terrain, cli.latency);
    let mut pose = rig.skeleton.clone();
    let mut prev_align: Isometry3<f32> = Isometry3::identity();
    let legs: Vec<_> = rig.controller.topology().chains().legs().collect();

    rig.controller.set_mode(IkMode::Moving);
    let total = cli.frames + cli.stop_frames;
    println!("frame      z  align_y  root_delta  ankles");
    for f in 1..=total {
        if f == cli.frames + 1 {
            rig.controller.set_mode(IkMode::Stopped);
            info!(frame = f, "stopping");
        }
        let walked = f.min(cli.frames) as f32 * dt * cli.speed;
        let align_y = service.sampler().sample(0.0, walked).map_or(0.0, |s| s.height);
        let align = Isometry3::translation(0.0, align_y, walked);
        let stepped = (align_y - prev_align.translation.vector.y).abs() > 0.05;

        pose.clone_from(&rig.skeleton);
        pose.transform_all(&align);
        let input = FrameInput::new(FrameNumber(u64::from(f)), dt, align)
            .with_previous(prev_align)
            .with_discontinuity(stepped);
        let faults = *rig.controller.update(&mut pose, &mut service, &input);
        if !faults.is_empty() {
            warn!(frame = f, ?faults, "recovered faults");
        }
        prev_align = align;

        if f % cli.every.max(1) == 0 || f == total {
            let ankles: Vec<String> = legs
                .iter()
                .map(|&leg| format!("{:.3}", rig.controller.topology().chain(leg).ankle(&pose).y))
                .collect();
            println!(
                "{f:5} {walked:6.2} {align_y:8.3} {:11.4}  [{}]",
                rig.controller.root_delta(),
                ankles.join(", ")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<(), StriderError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => LegIkConfig::from_file(path)?,
        None => LegIkConfig::default(),
    };
    let mut rig = build_rig(config, cli.quadruped)?;
    info!(terrain = ?cli.terrain, legs = rig.controller.leg_count().get(), "walking");

    match cli.terrain {
        Terrain::Stairs => {
            let stairs = Stairs {
                start_z: 1.0,
                rise: cli.step_height,
                depth: cli.step_depth,
                count: cli.steps,
            };
            walk(&cli, &mut rig, stairs);
        }
        Terrain::Bumpy => {
            #[allow(clippy::cast_precision_loss)]
            let length = cli.frames as f32 * rig.controller.config().controller.fixed_dt * cli.speed;
            match bumpy_field(length, cli.bump, cli.seed) {
                Some(field) => walk(&cli, &mut rig, field),
                None => warn!("bumpy field too small, nothing to walk on"),
            }
        }
    }
    Ok(())
}
