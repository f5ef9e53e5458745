//! Asset streaming: load files on worker threads and hot-reload them.
//!
//! Writes a few files into a scratch directory, points entities at them
//! through `AssetSource`, and ticks until every load has landed. One file
//! is then rewritten on disk and picked up again by the watcher.
//!
//! Run with: `cargo run -p skald --example asset_streaming`

use std::time::{Duration, Instant};

use skald::prelude::*;

fn tick_until(
    world: &mut EntityWorld,
    timeout: Duration,
    done: impl Fn(&EntityWorld) -> bool,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        world.tick();
        if done(world) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(16));
    }
    false
}

fn settled(world: &EntityWorld) -> bool {
    world.with_tag(LOADING_TAG).is_empty()
}

/// Enemy count from the loaded level file, if it has landed.
fn enemies(world: &EntityWorld) -> Option<i64> {
    world.component_ids::<AssetData>().into_iter().find_map(|id| {
        let data = world.component::<AssetData>(id)?;
        match &data.payload {
            AssetPayload::Json(value) if data.path == "level.json" => value["enemies"].as_i64(),
            _ => None,
        }
    })
}

fn report(world: &mut EntityWorld) {
    for (id, data) in world.query::<&AssetData>().iter() {
        match &data.payload {
            AssetPayload::Json(value) => log::info!("{id} {} -> {value}", data.path),
            AssetPayload::Bytes(bytes) => log::info!("{id} {} -> {} bytes", data.path, bytes.len()),
        }
    }
    for (id, failed) in world.query::<&AssetFailed>().iter() {
        log::warn!("{id} {} failed: {}", failed.path, failed.error);
    }
}

fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let root = std::env::temp_dir().join("skald_asset_streaming");
    std::fs::create_dir_all(&root)?;
    std::fs::write(root.join("level.json"), r#"{ "name": "caves", "enemies": 12 }"#)?;
    std::fs::write(root.join("music.ogg"), vec![0u8; 4096])?;

    let config = AssetConfig {
        worker_threads: 2,
        hot_reload: true,
        root: root.display().to_string(),
    };
    let mut world = EntityWorld::new();
    world.add_system(AssetLoaderSystem::new(config));

    for path in ["level.json", "music.ogg", "missing.png"] {
        let id = world.create_entity();
        world.add_component(id, AssetSource::new(path));
    }

    if !tick_until(&mut world, Duration::from_secs(5), settled) {
        log::error!("loads did not finish in time");
    }
    report(&mut world);

    std::fs::write(root.join("level.json"), r#"{ "name": "caves", "enemies": 30 }"#)?;
    log::info!("rewrote level.json, waiting for hot reload");
    let reloaded = tick_until(&mut world, Duration::from_secs(5), |w| enemies(w) == Some(30));
    if reloaded {
        report(&mut world);
    } else {
        log::warn!("no reload observed (file watching may be unavailable here)");
    }

    std::fs::remove_dir_all(&root).ok();
    Ok(())
}
