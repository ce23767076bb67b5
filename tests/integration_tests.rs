use image_scan::domain::{ContainerSpec, ImageRef, Separator, ShellScript};
use image_scan::infra::docker_adapter::create_args;

#[test]
fn test_scan_container_arguments() {
    let image = ImageRef::parse("1645370/ortelius-test:latest").unwrap();
    let reference = image.to_string();
    let env = vec!["DB_HOST=192.168.225.51".to_string(), "DB_PORT=9876".to_string()];
    let argv = ShellScript::defaults(Separator::And).argv();

    let spec = ContainerSpec::new("scan_container", &reference)
        .env(&env)
        .entrypoint(&argv);
    let args = create_args(&spec);

    let image_pos = args.iter().position(|a| a == &reference).unwrap();
    assert_eq!(args[image_pos - 2], "--entrypoint");
    assert_eq!(args[image_pos - 1], "/bin/sh");
    assert_eq!(args[image_pos + 1], "-c");
    assert!(args[image_pos + 2].ends_with("safety check -r requirements.txt --json --output /tmp/cve.json || true"));
    assert_eq!(args.len(), image_pos + 3);
}

#[test]
fn test_spec_without_entrypoint_keeps_image_command() {
    let spec = ContainerSpec::new("app", "registry.local:5000/team/app:1.2").port(Some(8080));
    let args = create_args(&spec);

    assert_eq!(args.last().unwrap(), "registry.local:5000/team/app:1.2");
    assert!(args.contains(&"0.0.0.0:8080:8080/tcp".to_string()));
    assert!(args.windows(2).any(|w| w[0] == "--expose" && w[1] == "8080/tcp"));
}
