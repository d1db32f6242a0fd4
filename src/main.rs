use clap::Parser;

use terrain_paths::config::Config;
use terrain_paths::error::TerrainError;
use terrain_paths::output;
use terrain_paths::scene::Scene;

fn main() {
    let config = Config::parse();
    if let Err(e) = run(config) {
        output::report_error(&e.to_string());
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), TerrainError> {
    let mode = config.solve_mode()?;

    output::progress(&format!(
        "Patch size: {0}x{0}",
        config.patch_size
    ));
    output::progress(&format!("Mode: {mode:?}, seed: {}", config.seed));
    if config.auto.is_some() {
        output::progress("Headless mode enabled.");
    }

    let mut scene = Scene::new(mode, config.patch_size, config.seed);
    let handle = scene.add_patch((0, 0))?;

    while !scene.all_done() {
        scene.tick()?;
    }

    if let Some(patch) = scene.get(handle) {
        output::progress(&format!(
            "All modifiers finished after {} solver iterations.",
            patch.total_iterations()
        ));
    }
    Ok(())
}
