//! Integration tests for YAML parsing

mod common;

use brisk::config::{
    find_config_file_from, layer_config, parse_config, parse_config_file, validate_config,
    StepDef,
};
use brisk::error::{BriskError, ConfigError};
use brisk::runner::{BuildContext, Step, TaskRef};
use std::fs;

const DOPPIO: &str = r#"
name: doppio
usage: Doppio build
metadata: package.json
settings:
  interpreter: [sh, -c]
  action-timeout: 600
vars:
  build:
    java: java
    vendor_dir: {path: ["${project.dir}", vendor]}
    java_home_dir: {path: ["${build.vendor_dir}", java_home]}
    build_dir: {path: ["${project.dir}", build, "${build.build_type}"]}
    natives: ["src/natives/*.ts", "src/natives/**/*.ts"]
tasks:
  setup:
    usage: Sets up the environment prior to building
    private: true
    steps:
      - build-type: "${task.variant}"
      - ensure:
          missing: "${build.java_home_dir}"
          message: Running one-time java_home setup
          run: [fetch-java-home]
      - flag:
          name: types-ready
          exists: includes/JVMTypes.d.ts
    variants: [dev, dev-cli, release, release-cli]
  fetch-java-home:
    private: true
    steps:
      - action: download
        with:
          url: "https://example.com/java_home.tar.gz"
          dest: "${build.vendor_dir}"
      - action: extract
        with:
          archive: "${build.vendor_dir}/java_home.tar.gz"
          dest: "${build.vendor_dir}"
      - action: delete
        with:
          path: "${build.vendor_dir}/java_home.tar.gz"
  make-build-dir:
    - action: mkdir
      with:
        path: "${build.build_dir}"
  launcher:
    options:
      src: "${build.build_dir}/console/runner.js"
    steps:
      - action: launcher
        with:
          src: "${task.src}"
          dest: "${task.dest}"
          interpreter: node
    variants:
      doppio:
        options:
          dest: "${project.dir}/doppio"
      doppio-dev:
        options:
          dest: "${project.dir}/doppio-dev"
  dev-cli:
    usage: Builds the command line interface
    steps:
      - setup:dev-cli
      - make-build-dir
      - exec: tsc -p src
        strict-if: types-ready
      - task: launcher
        variant: doppio-dev
watch:
  ts-source:
    files: ["src/*.ts", "src/**/*.ts"]
    tasks: ["setup:dev-cli", "dev-cli"]
"#;

#[test]
fn test_parse_complete_config() {
    let config = parse_config(DOPPIO).unwrap();

    assert_eq!(config.name.as_deref(), Some("doppio"));
    assert_eq!(config.metadata.as_deref(), Some("package.json"));
    assert_eq!(config.settings.action_timeout, Some(600));
    assert_eq!(config.tasks.len(), 5);

    let setup = &config.tasks["setup"];
    assert!(setup.private);
    assert_eq!(setup.variants.len(), 4);
    assert_eq!(setup.steps.as_ref().map(Vec::len), Some(3));

    let make_build_dir = &config.tasks["make-build-dir"];
    assert_eq!(make_build_dir.steps.as_ref().map(Vec::len), Some(1));

    let dev_cli = config.tasks["dev-cli"].steps.as_ref().unwrap();
    assert!(matches!(&dev_cli[0], StepDef::Reference(r) if r == "setup:dev-cli"));

    assert_eq!(config.watch["ts-source"].tasks, vec!["setup:dev-cli", "dev-cli"]);
}

#[test]
fn test_validate_complete_config() {
    let config = parse_config(DOPPIO).unwrap();
    let registry = validate_config(&config).unwrap();

    assert_eq!(
        registry.variants("setup"),
        vec!["dev", "dev-cli", "release", "release-cli"]
    );

    let dev_cli = registry.get("dev-cli", None).unwrap();
    assert_eq!(dev_cli.steps[0], Step::Task(TaskRef::new("setup", Some("dev-cli"))));
    assert_eq!(
        dev_cli.steps[3],
        Step::Task(TaskRef::new("launcher", Some("doppio-dev")))
    );

    let launcher = registry.get("launcher", Some("doppio")).unwrap();
    assert!(launcher.options.contains_key("src"));
    assert!(launcher.options.contains_key("dest"));
}

#[test]
fn test_context_from_config_derives_paths_from_build_type() {
    let (temp_dir, config_path) = common::create_test_config(DOPPIO);
    fs::write(
        temp_dir.path().join("package.json"),
        r#"{"name": "doppio", "version": "0.3.0", "scripts": {"test": "grunt test"}}"#,
    )
    .unwrap();

    let config = parse_config_file(&config_path).unwrap();
    let mut ctx = BuildContext::from_config(&config, &config_path).unwrap();
    let root = temp_dir.path().to_string_lossy().into_owned();

    assert_eq!(ctx.resolve("pkg.version").unwrap(), "0.3.0");
    assert!(ctx.resolve("pkg.scripts").is_err());
    assert_eq!(
        ctx.resolve("build.java_home_dir").unwrap(),
        format!("{}/vendor/java_home", root)
    );
    assert_eq!(ctx.action_timeout.as_secs(), 600);

    ctx.set_build_type("release");
    assert_eq!(
        ctx.resolve("build.build_dir").unwrap(),
        format!("{}/build/release", root)
    );
}

#[test]
fn test_missing_metadata_file_is_an_error() {
    let (_temp_dir, config_path) = common::create_test_config(DOPPIO);
    let config = parse_config_file(&config_path).unwrap();

    assert!(matches!(
        BuildContext::from_config(&config, &config_path),
        Err(BriskError::Config(ConfigError::Metadata { .. }))
    ));
}

#[test]
fn test_find_config_in_parent_directory() {
    let (_temp_dir, config_path, sub_dir) =
        common::create_test_config_in_subdir("tasks:\n  hello:\n    - exec: echo hi\n");

    let found = find_config_file_from(sub_dir).unwrap();
    assert_eq!(found, config_path);
}

#[test]
fn test_config_not_found() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    // The search walks up to the filesystem root; only assert when nothing
    // above the temp dir carries a brisk.yml either.
    if let Err(e) = find_config_file_from(temp_dir.path().to_path_buf()) {
        assert!(matches!(e, ConfigError::NotFound(_)));
    }
}

#[test]
fn test_user_defaults_are_overridden_by_project() {
    let defaults = parse_config(
        r#"
settings:
  action-timeout: 60
  interpreter: [bash, -c]
vars:
  build:
    java: /opt/jdk/bin/java
    javac: /opt/jdk/bin/javac
"#,
    )
    .unwrap();
    let project = parse_config(
        r#"
settings:
  action-timeout: 900
vars:
  build:
    java: java
tasks:
  hello:
    - exec: echo hi
"#,
    )
    .unwrap();

    let config = layer_config(defaults, project);
    assert_eq!(config.settings.action_timeout, Some(900));
    assert_eq!(
        config.settings.interpreter,
        Some(vec!["bash".to_string(), "-c".to_string()])
    );

    let ctx_store = {
        let mut store = brisk::config::ConfigStore::new();
        store.merge_yaml(None, &config.vars).unwrap();
        store
    };
    let ctx = BuildContext::new().with_store(ctx_store);
    assert_eq!(ctx.resolve("build.java").unwrap(), "java");
    assert_eq!(ctx.resolve("build.javac").unwrap(), "/opt/jdk/bin/javac");
    assert!(config.tasks.contains_key("hello"));
}

#[test]
fn test_invalid_step_is_reported_with_position() {
    let yaml = r#"
tasks:
  broken:
    - exec: echo one
    - exec: echo two
      task: other
"#;
    let config = parse_config(yaml).unwrap();
    match validate_config(&config) {
        Err(BriskError::Config(ConfigError::InvalidStep { task, index, .. })) => {
            assert_eq!(task, "broken");
            assert_eq!(index, 1);
        }
        other => panic!("expected invalid step, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_unknown_step_key_is_a_parse_error() {
    let yaml = r#"
tasks:
  broken:
    - exec: echo one
      retries: 3
"#;
    assert!(parse_config(yaml).is_err());
}

#[test]
fn test_variant_without_steps_and_no_base() {
    let yaml = r#"
tasks:
  ts:
    variants:
      dev:
        options:
          out: build/dev
"#;
    let config = parse_config(yaml).unwrap();
    assert!(validate_config(&config).is_err());
}
