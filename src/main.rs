use anyhow::Result;

use gesturectl::actions::{ActionBackend, NoopActions};
use gesturectl::config::AppConfig;
use gesturectl::cursor::{NoopPointer, PointerBackend};
use gesturectl::pipeline::source::unavailable_source_factory;
use gesturectl::server;
use gesturectl::service::{Service, ServiceDeps};

fn main() -> Result<()> {
    env_logger::init();

    let config = AppConfig::load()?;
    let socket_path = config.socket_path.clone();

    let deps = ServiceDeps {
        // Capture backends plug in through the frame-source seam; without
        // one, camera_start reports an error event instead of crashing.
        source_factory: unavailable_source_factory(),
        actions: default_actions(),
        pointer: default_pointer(),
    };

    let (handle, join) = Service::spawn(config, deps)?;
    let result = server::run(&socket_path, handle.clone());

    handle.shutdown();
    let _ = join.join();
    result
}

#[cfg(feature = "input-enigo")]
fn default_actions() -> Box<dyn ActionBackend> {
    match gesturectl::actions::EnigoActions::new() {
        Ok(backend) => Box::new(backend),
        Err(err) => {
            log::warn!("enigo keystroke backend unavailable, using noop: {err:?}");
            Box::new(NoopActions)
        }
    }
}

#[cfg(not(feature = "input-enigo"))]
fn default_actions() -> Box<dyn ActionBackend> {
    Box::new(NoopActions)
}

#[cfg(feature = "input-enigo")]
fn default_pointer() -> Box<dyn PointerBackend> {
    match gesturectl::actions::EnigoPointer::new() {
        Ok(backend) => Box::new(backend),
        Err(err) => {
            log::warn!("enigo pointer backend unavailable, using noop: {err:?}");
            Box::new(NoopPointer)
        }
    }
}

#[cfg(not(feature = "input-enigo"))]
fn default_pointer() -> Box<dyn PointerBackend> {
    Box::new(NoopPointer)
}
