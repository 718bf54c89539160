//! # provider-local
//!
//! A provider that manages files on the machine running the plugin.
//!
//! It exposes one resource type, `local_file`, and an optional `root_dir`
//! provider setting that relative filenames are resolved against. Resource
//! ids are canonical absolute paths. Everything is plain filesystem access,
//! which makes this provider useful for exercising the plugin server end to
//! end.

use chrono::{DateTime, Utc};
use plinth_provider_core::prelude::*;
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Resource type name for managed files.
pub const RESOURCE_LOCAL_FILE: &str = "local_file";

/// Permission applied when configuration leaves `file_permission` unset.
pub const DEFAULT_FILE_PERMISSION: &str = "0644";

/// Provider for local files.
pub struct LocalProvider {
    root_dir: RwLock<Option<PathBuf>>,
}

/// Desired state of a `local_file`, pulled out of a JSON object.
#[derive(Debug, Clone, PartialEq)]
struct FileSpec {
    filename: String,
    content: String,
    permission: String,
}

impl LocalProvider {
    /// Create a provider that resolves relative paths against the working
    /// directory until configured otherwise.
    pub fn new() -> Self {
        Self {
            root_dir: RwLock::new(None),
        }
    }

    /// Create a provider with a preset root directory.
    pub fn with_root_dir(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: RwLock::new(Some(root_dir.into())),
        }
    }

    fn local_file_schema() -> Schema {
        Schema::v0()
            .with_description("A file on the local filesystem")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("Canonical path of the file"),
            )
            .with_attribute(
                "filename",
                Attribute::required_string()
                    .force_new()
                    .with_description("Path of the file; relative paths use root_dir"),
            )
            .with_attribute("content", Attribute::required_string())
            .with_attribute(
                "file_permission",
                Attribute::optional_string()
                    .with_default_computed()
                    .with_description("Octal permission bits, e.g. \"0644\""),
            )
            .with_attribute("content_length", Attribute::computed(AttributeType::Number))
            .with_attribute(
                "last_modified",
                Attribute::computed_string().with_description("RFC 3339 modification time"),
            )
    }

    async fn resolve(&self, filename: &str) -> PathBuf {
        let path = Path::new(filename);
        if path.is_absolute() {
            return path.to_path_buf();
        }

        match self.root_dir.read().await.as_ref() {
            Some(root) => root.join(path),
            None => path.to_path_buf(),
        }
    }

    async fn write_file(&self, spec: &FileSpec) -> Result<PathBuf> {
        let mode = parse_permission(&spec.permission)?;
        let path = self.resolve(&spec.filename).await;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, spec.content.as_bytes()).await?;
        set_mode(&path, mode).await?;

        let path = tokio::fs::canonicalize(&path).await?;
        debug!("Wrote {} ({} bytes)", path.display(), spec.content.len());
        Ok(path)
    }

    async fn read_state(&self, filename: &str, permission: &str) -> Result<Option<Value>> {
        let path = self.resolve(filename).await;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content = String::from_utf8(bytes).map_err(|_| {
            ProviderError::Provider(format!("{} is not valid UTF-8", path.display()))
        })?;

        let path = tokio::fs::canonicalize(&path).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        let last_modified: DateTime<Utc> = metadata.modified()?.into();

        Ok(Some(json!({
            "id": path.to_string_lossy(),
            "filename": filename,
            "content_length": content.len(),
            "content": content,
            "file_permission": current_mode(&metadata).unwrap_or_else(|| permission.to_string()),
            "last_modified": last_modified.to_rfc3339(),
        })))
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_local_file(type_name: &str) -> Result<()> {
    if type_name == RESOURCE_LOCAL_FILE {
        Ok(())
    } else {
        Err(ProviderError::UnknownResourceType(type_name.to_string()))
    }
}

fn string_attr(state: &Value, name: &str) -> Option<String> {
    state.get(name).and_then(Value::as_str).map(str::to_string)
}

fn parse_spec(state: &Value) -> Result<FileSpec> {
    let mut diagnostics = Vec::new();

    let filename = string_attr(state, "filename");
    if filename.is_none() {
        diagnostics.push(Diagnostic::error("missing required attribute").with_attribute("filename"));
    }
    let content = string_attr(state, "content");
    if content.is_none() {
        diagnostics.push(Diagnostic::error("missing required attribute").with_attribute("content"));
    }

    match (filename, content) {
        (Some(filename), Some(content)) => Ok(FileSpec {
            filename,
            content,
            permission: string_attr(state, "file_permission")
                .unwrap_or_else(|| DEFAULT_FILE_PERMISSION.to_string()),
        }),
        _ => Err(ProviderError::InvalidConfig(diagnostics)),
    }
}

/// Parse an octal permission string such as `"0644"` or `"755"`.
fn parse_permission(raw: &str) -> Result<u32> {
    Some(raw)
        .filter(|raw| !raw.is_empty() && raw.chars().all(|c| ('0'..='7').contains(&c)))
        .and_then(|raw| u32::from_str_radix(raw, 8).ok())
        .filter(|mode| *mode <= 0o777)
        .ok_or_else(|| {
            ProviderError::InvalidConfig(vec![Diagnostic::error("invalid file permission")
                .with_detail(format!("{:?} is not an octal mode between 0000 and 0777", raw))
                .with_attribute("file_permission")])
        })
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn current_mode(metadata: &std::fs::Metadata) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;
    Some(format!("{:04o}", metadata.permissions().mode() & 0o777))
}

#[cfg(not(unix))]
fn current_mode(_metadata: &std::fs::Metadata) -> Option<String> {
    None
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} already removed", path.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(Schema::v0().with_attribute(
                "root_dir",
                Attribute::optional_string()
                    .with_description("Directory relative filenames are resolved against"),
            ))
            .with_resource(RESOURCE_LOCAL_FILE, Self::local_file_schema())
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>> {
        let mut diagnostics = self.schema().provider.validate_config(&config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let root_dir = string_attr(&config, "root_dir").map(PathBuf::from);
        if let Some(root) = &root_dir {
            if !root.exists() {
                diagnostics.push(
                    Diagnostic::warning("root_dir does not exist")
                        .with_detail("It will be created when the first file is written")
                        .with_attribute("root_dir"),
                );
            }
            info!("Local provider rooted at {}", root.display());
        }

        *self.root_dir.write().await = root_dir;
        Ok(diagnostics)
    }

    async fn validate_resource_config(
        &self,
        type_name: &str,
        config: &Value,
    ) -> Result<Vec<Diagnostic>> {
        ensure_local_file(type_name)?;

        let mut diagnostics = Self::local_file_schema().validate_config(config);
        if let Some(raw) = string_attr(config, "file_permission") {
            if let Err(ProviderError::InvalidConfig(found)) = parse_permission(&raw) {
                diagnostics.extend(found);
            }
        }
        Ok(diagnostics)
    }

    async fn create(&self, type_name: &str, planned_state: Value) -> Result<Value> {
        ensure_local_file(type_name)?;
        let spec = parse_spec(&planned_state)?;

        let path = self.write_file(&spec).await?;
        info!("Created {}", path.display());

        self.read_state(&spec.filename, &spec.permission)
            .await?
            .ok_or_else(|| ProviderError::Provider(format!("{} vanished after write", path.display())))
    }

    async fn read(&self, type_name: &str, current_state: Value) -> Result<Option<Value>> {
        ensure_local_file(type_name)?;

        let filename = string_attr(&current_state, "filename")
            .or_else(|| string_attr(&current_state, "id"))
            .ok_or_else(|| {
                ProviderError::InvalidConfig(vec![
                    Diagnostic::error("state has no filename").with_attribute("filename")
                ])
            })?;
        let permission = string_attr(&current_state, "file_permission")
            .unwrap_or_else(|| DEFAULT_FILE_PERMISSION.to_string());

        self.read_state(&filename, &permission).await
    }

    async fn update(&self, type_name: &str, prior_state: Value, planned_state: Value) -> Result<Value> {
        ensure_local_file(type_name)?;
        let prior = parse_spec(&prior_state)?;
        let planned = parse_spec(&planned_state)?;

        let new_path = self.write_file(&planned).await?;
        let old_path = self.resolve(&prior.filename).await;
        match tokio::fs::canonicalize(&old_path).await {
            Ok(old_path) if old_path != new_path => {
                remove_if_present(&old_path).await?;
                info!("Moved {} to {}", old_path.display(), new_path.display());
            }
            Ok(_) => info!("Updated {}", new_path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Wrote {}; {} was already gone", new_path.display(), old_path.display());
            }
            Err(e) => return Err(e.into()),
        }

        self.read_state(&planned.filename, &planned.permission)
            .await?
            .ok_or_else(|| ProviderError::Provider(format!("{} vanished after write", new_path.display())))
    }

    async fn delete(&self, type_name: &str, current_state: Value) -> Result<()> {
        ensure_local_file(type_name)?;

        let filename = string_attr(&current_state, "filename")
            .or_else(|| string_attr(&current_state, "id"))
            .ok_or_else(|| ProviderError::NotFound("state has no filename".to_string()))?;
        let path = self.resolve(&filename).await;

        remove_if_present(&path).await?;
        info!("Deleted {}", path.display());
        Ok(())
    }

    async fn import(&self, type_name: &str, id: &str) -> Result<Vec<ImportedResource>> {
        ensure_local_file(type_name)?;

        let state = self
            .read_state(id, DEFAULT_FILE_PERMISSION)
            .await?
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;

        Ok(vec![ImportedResource {
            type_name: RESOURCE_LOCAL_FILE.to_string(),
            state,
        }])
    }
}
