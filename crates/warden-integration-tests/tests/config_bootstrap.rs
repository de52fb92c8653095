//! Building a warden from a configuration file.

use warden_config::Config;
use warden_core::{ActionKind, Parameters};
use warden_runtime::Warden;
use warden_test::test_requester;

#[tokio::test]
async fn config_file_wires_limits_plugins_and_audit() {
    let home = tempfile::tempdir().unwrap();
    let work = home.path().join("work");
    let plugins = home.path().join("plugins");
    std::fs::create_dir_all(&work).unwrap();
    std::fs::create_dir_all(&plugins).unwrap();
    std::fs::write(
        plugins.join("disk_usage.toml"),
        "name = \"disk_usage\"\n[execution]\ntype = \"bash\"\ncommand = \"du -sh .\"\n",
    )
    .unwrap();

    let audit = home.path().join("logs").join("audit.jsonl");
    let config_path = home.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[sandbox]\nwork_dir = {work:?}\n\n[plugins]\ndir = {plugins:?}\n\n\
             [audit]\npath = {audit:?}\n\n[rate_limits.api]\nwindow_secs = 60\nmax_requests = 2\n"
        ),
    )
    .unwrap();

    let config = Config::load_file(&config_path).unwrap();
    let warden = Warden::from_config_with_home(&config, home.path()).unwrap();
    assert_eq!(warden.dispatcher().plugins().names(), vec!["disk_usage"]);

    let mut outputs = Vec::new();
    for _ in 0..3 {
        outputs.push(
            warden
                .dispatcher()
                .submit(
                    ActionKind::builtin("list_directory"),
                    Parameters::new(),
                    test_requester(),
                )
                .await,
        );
    }
    assert!(!outputs[0].is_error, "{}", outputs[0].output);
    assert!(!outputs[1].is_error);
    assert!(outputs[2].is_error);
    assert_eq!(outputs[2].output, "too many requests, try again later");

    let lines = std::fs::read_to_string(&audit).unwrap();
    assert_eq!(lines.lines().count(), 3);
    assert!(lines.lines().last().unwrap().contains("rate_limited"));
}
