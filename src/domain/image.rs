use anyhow::{Result, bail};
use std::fmt;

/// A parsed image reference such as `registry.local:5000/team/app:1.2`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("Image name is empty");
        }
        if input.chars().any(char::is_whitespace) {
            bail!("Image name '{input}' contains whitespace");
        }

        let (name, digest) = match input.split_once('@') {
            Some((name, digest)) => {
                if digest.is_empty() {
                    bail!("Image '{input}' has an empty digest");
                }
                (name, Some(digest.to_string()))
            }
            None => (input, None),
        };

        // A ':' after the last '/' is a tag; earlier ones belong to a registry port.
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(pos) => {
                let split = last_slash + pos;
                let tag = &name[split + 1..];
                if tag.is_empty() {
                    bail!("Image '{input}' has an empty tag");
                }
                (&name[..split], Some(tag.to_string()))
            }
            None => (name, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (Some(first.to_string()), rest),
            _ => (None, name),
        };

        if repository.split('/').any(str::is_empty) {
            bail!("Image '{input}' has an empty repository component");
        }
        if repository.chars().any(|c| c.is_ascii_uppercase()) {
            bail!("Repository '{repository}' must be lowercase");
        }

        Ok(Self {
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Login server for this image; `None` means Docker Hub
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

/// Registry credentials used for a single pull
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Returns `None` when no username was given (anonymous pull)
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        let username = username.map(str::trim).filter(|u| !u.is_empty())?;
        Some(Self {
            username: username.to_string(),
            password: password.unwrap_or_default().to_string(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
