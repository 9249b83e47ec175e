//
// Footstep planning on a small occupancy grid with an obstacle, followed by
// a map update that blocks part of the plan.
//
// usage: footstep_planner [config.yaml]

use std::path::Path;
use std::sync::Arc;

use log::{error, info};
use nalgebra::DMatrix;

use footstep_planner::mapping::GridMap2D;
use footstep_planner::{FootstepPlanner, PlannerConfig, PlannerResult, Pose2D};

const RESOLUTION: f64 = 0.01;

fn build_map(with_box: bool) -> PlannerResult<GridMap2D> {
    // 3 m x 2 m, origin at (-0.5, -1.0)
    let occupancy = DMatrix::from_fn(300, 200, |x, y| {
        let pillar = (140..160).contains(&x) && (80..120).contains(&y);
        let update = with_box && (180..195).contains(&x) && (130..150).contains(&y);
        pillar || update
    });
    GridMap2D::new(occupancy, RESOLUTION, -0.5, -1.0)
}

fn run(config: PlannerConfig) -> PlannerResult<()> {
    let mut planner = FootstepPlanner::new(config)?;
    planner.set_map(Arc::new(build_map(false)?))?;
    planner.plan(&Pose2D::new(0.0, 0.0, 0.0), &Pose2D::new(2.0, 0.0, 0.0))?;

    if let Some(path) = planner.path() {
        for (i, step) in path.steps.iter().enumerate() {
            println!("{:3}: {}", i, step);
        }
        println!("cost: {:.3}", path.cost);
    }

    let update = planner.set_map(Arc::new(build_map(true)?))?;
    info!("map update: {:?}", update);
    if let Some(path) = planner.path() {
        println!("after update: {} steps, cost {:.3}", path.len(), path.cost);
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => match PlannerConfig::load(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                error!("could not load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => PlannerConfig::default(),
    };

    if let Err(e) = run(config) {
        error!("{}", e);
        std::process::exit(1);
    }
}
