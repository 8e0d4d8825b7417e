use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use depth_mask::config::MaskNodeConfig;
use depth_mask::PaletteSource;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "MASK_NODE_CONFIG",
        "MASK_DISABLE_CIRCLE_DEPTH",
        "MASK_DISABLE_MASK_DEPTH",
        "MASK_QUERY_TIMEOUT_MS",
        "MASK_DEPTH_SEARCH_RADIUS",
        "MASK_PALETTE_SEED",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MaskNodeConfig::load().expect("load config");
    assert!(cfg.disable_circle_depth);
    assert!(!cfg.disable_mask_depth);
    assert_eq!(cfg.query_timeout, Duration::from_secs(10));
    assert_eq!(cfg.depth_search_radius, 4);
    assert_eq!(cfg.palette_seed, None);
    assert_eq!(cfg.camera.url, "stub://camera");
    assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (640, 480, 10));

    let settings = cfg.pipeline_settings();
    assert!(settings.circle.is_none());
    assert!(matches!(settings.palette, PaletteSource::Random));
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "disable_circle_depth": false,
            "query_timeout_ms": 2500,
            "depth_search_radius": 2,
            "palette_seed": 7,
            "camera": {
                "url": "stub://bench",
                "fps": 15,
                "width": 320,
                "height": 240
            }
        }"#,
    );

    std::env::set_var("MASK_NODE_CONFIG", file.path());
    std::env::set_var("MASK_DISABLE_MASK_DEPTH", "true");
    std::env::set_var("MASK_DEPTH_SEARCH_RADIUS", "6");

    let cfg = MaskNodeConfig::load().expect("load config");

    assert!(!cfg.disable_circle_depth);
    assert!(cfg.disable_mask_depth);
    assert_eq!(cfg.query_timeout, Duration::from_millis(2500));
    assert_eq!(cfg.depth_search_radius, 6);
    assert_eq!(cfg.palette_seed, Some(7));
    assert_eq!(cfg.camera.url, "stub://bench");
    assert_eq!(cfg.camera.fps, 15);

    let settings = cfg.pipeline_settings();
    assert!(settings.circle.is_some());
    assert_eq!(settings.depth_policy.search_radius, 6);
    assert!(matches!(settings.palette, PaletteSource::Seeded(7)));

    let camera = cfg.camera_config();
    assert_eq!((camera.width, camera.height), (320, 240));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("MASK_QUERY_TIMEOUT_MS", "0");
    assert!(MaskNodeConfig::load().is_err());
    clear_env();

    std::env::set_var("MASK_DISABLE_MASK_DEPTH", "maybe");
    assert!(MaskNodeConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{ "camera": { "fps": 0 } }"#);
    assert!(MaskNodeConfig::load_from(Some(file.path())).is_err());

    let file = write_config("{ not json");
    let err = MaskNodeConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
