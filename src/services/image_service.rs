use crate::domain::{ContainerRuntime, Credentials, ImageRef, ShellScript};
use crate::infra::archive;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Image-level engine operations (pull, build, remove)
pub struct ImageService {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ImageService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn pull(&self, image: &ImageRef, credentials: Option<&Credentials>) -> Result<()> {
        match credentials {
            Some(creds) => info!("Pulling {image} as {}", creds.username),
            None => info!("Pulling {image}"),
        }
        self.runtime.pull_image(image, credentials)
    }

    /// Builds `tag` from a Dockerfile, optionally baking `injected` in as a final layer
    pub fn build(
        &self,
        tag: &str,
        dockerfile: &Path,
        context_files: &[PathBuf],
        injected: Option<&ShellScript>,
    ) -> Result<()> {
        let (context, dockerfile_name) =
            archive::build_context(dockerfile, context_files, injected)?;

        info!(
            "Building image {tag} from {:?} ({} bytes of context)",
            dockerfile,
            context.len()
        );
        self.runtime.build_image(tag, &dockerfile_name, &context)?;
        info!("Image {tag} built");

        Ok(())
    }

    pub fn remove(&self, image: &str) -> Result<()> {
        info!("Removing image {image}");
        self.runtime.remove_image(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRuntime;

    #[test]
    fn test_pull_with_credentials_logs_in_first() {
        let mock = Arc::new(MockRuntime::new());
        let service = ImageService::new(mock.clone());
        let image = ImageRef::parse("1645370/ortelius-test:latest").unwrap();
        let creds = Credentials::from_parts(Some("bob"), Some("pw"));

        service.pull(&image, creds.as_ref()).unwrap();

        assert_eq!(
            mock.get_commands(),
            vec![
                "login:bob".to_string(),
                "pull:1645370/ortelius-test:latest".to_string()
            ]
        );
    }

    #[test]
    fn test_build_image() {
        let mock = Arc::new(MockRuntime::new());
        let service = ImageService::new(mock.clone());
        let dir = tempfile::tempdir().unwrap();
        let dockerfile = dir.path().join("Dockerfile");
        std::fs::write(&dockerfile, "FROM python:3.10\n").unwrap();

        service.build("go-check", &dockerfile, &[], None).unwrap();

        assert!(mock.has_image("go-check"));
        assert!(mock.get_commands().contains(&"build_image:go-check".to_string()));
    }

    #[test]
    fn test_build_fails_without_dockerfile() {
        let mock = Arc::new(MockRuntime::new());
        let service = ImageService::new(mock.clone());

        let result = service.build("go-check", Path::new("/nonexistent/Dockerfile"), &[], None);

        assert!(result.is_err());
        assert!(mock.get_commands().is_empty());
    }

    #[test]
    fn test_remove_image() {
        let mock = Arc::new(MockRuntime::new());
        let service = ImageService::new(mock.clone());

        service.remove("go-check").unwrap();

        assert!(mock.get_commands().contains(&"remove_image:go-check".to_string()));
    }
}
