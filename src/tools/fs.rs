//! Sandboxed file tools: `read_file`, `list_files`, `edit_file`, `create_file`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use crate::error::ToolError;
use crate::sandbox::Sandbox;

use super::{parse_input, Tool, ToolName};

fn not_found_or(err: std::io::Error, missing: String, context: String) -> ToolError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ToolError::validation(missing)
    } else {
        ToolError::io(context, err)
    }
}

// ============ read_file ============

pub struct ReadFileTool {
    sandbox: Sandbox,
}

impl ReadFileTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[derive(Deserialize)]
struct ReadFileInput {
    #[serde(default)]
    path: String,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> ToolName {
        ToolName::ReadFile
    }

    fn description(&self) -> &str {
        "Read the contents of a file within the workspace directory. Provide the path relative to \
         the workspace root (e.g., 'subdir/my_file.txt'). Do not use directory names."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The path of the file relative to the workspace directory." }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String, ToolError> {
        let input: ReadFileInput = parse_input(self.name(), params)?;
        if input.path.is_empty() {
            return Err(ToolError::validation("path is required for read_file"));
        }
        let path = self.sandbox.resolve(&input.path)?;

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            not_found_or(
                e,
                format!("file not found at path '{}' within workspace", input.path),
                format!("failed to stat file '{}'", input.path),
            )
        })?;
        if metadata.is_dir() {
            return Err(ToolError::validation(format!(
                "path '{}' is a directory, not a file",
                input.path
            )));
        }

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::io(format!("failed to read file '{}'", input.path), e))
    }
}

// ============ list_files ============

pub struct ListFilesTool {
    sandbox: Sandbox,
}

impl ListFilesTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[derive(Deserialize)]
struct ListFilesInput {
    #[serde(default)]
    path: String,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> ToolName {
        ToolName::ListFiles
    }

    fn description(&self) -> &str {
        "List files and directories within the workspace directory. Provide the path relative to \
         the workspace root (e.g., 'subdir' or '.'). Defaults to the workspace root if no path is provided."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Optional path relative to the workspace root. Defaults to the workspace root if empty or '.'." }
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<String, ToolError> {
        let input: ListFilesInput = parse_input(self.name(), params)?;
        let requested = if input.path.is_empty() {
            ".".to_string()
        } else {
            input.path
        };
        let dir = self.sandbox.resolve(&requested)?;

        let metadata = tokio::fs::metadata(&dir).await.map_err(|e| {
            not_found_or(
                e,
                format!("directory not found at path '{}' within workspace", requested),
                format!("failed to stat directory '{}'", requested),
            )
        })?;
        if !metadata.is_dir() {
            return Err(ToolError::validation(format!(
                "path '{}' is not a directory",
                requested
            )));
        }

        let prefix = self.sandbox.relative_display(&dir);
        let read_err = |e| ToolError::io(format!("failed to read directory '{}'", requested), e);
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(read_err)?;

        let mut listing = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            if prefix.is_empty() {
                listing.push(name);
            } else {
                listing.push(format!("{}/{}", prefix, name));
            }
        }
        listing.sort();

        Ok(serde_json::to_string(&listing)?)
    }
}

// ============ edit_file ============

pub struct EditFileTool {
    sandbox: Sandbox,
}

impl EditFileTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[derive(Deserialize)]
struct EditFileInput {
    #[serde(default)]
    path: String,
    #[serde(default)]
    old_str: String,
    #[serde(default)]
    new_str: String,
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> ToolName {
        ToolName::EditFile
    }

    fn description(&self) -> &str {
        "Search for an exact string ('old_str') in a file within the workspace (specified by 'path' \
         relative to workspace root) and replace its single occurrence with 'new_str'. Fails if \
         'old_str' is not found or found multiple times."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The path to the file relative to the workspace directory." },
                "old_str": { "type": "string", "description": "Exact text to search for. Must match exactly once." },
                "new_str": { "type": "string", "description": "Text to replace old_str with." }
            },
            "required": ["path", "old_str", "new_str"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String, ToolError> {
        let input: EditFileInput = parse_input(self.name(), params)?;
        if input.path.is_empty() || input.old_str.is_empty() {
            return Err(ToolError::validation(
                "path and old_str are required for edit_file",
            ));
        }
        let path = self.sandbox.resolve(&input.path)?;

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            not_found_or(
                e,
                format!("file not found at path '{}' within workspace", input.path),
                format!("failed to stat file '{}'", input.path),
            )
        })?;
        if metadata.is_dir() {
            return Err(ToolError::validation(format!(
                "path '{}' is a directory, cannot edit",
                input.path
            )));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::io(format!("failed to read file '{}'", input.path), e))?;

        match content.matches(input.old_str.as_str()).count() {
            0 => Err(ToolError::validation(format!(
                "string '{}' not found in file '{}'",
                input.old_str, input.path
            ))),
            1 => {
                let updated = content.replacen(&input.old_str, &input.new_str, 1);
                // Writing to the existing file keeps its permissions.
                tokio::fs::write(&path, updated).await.map_err(|e| {
                    ToolError::io(
                        format!("failed to write changes to file '{}'", input.path),
                        e,
                    )
                })?;
                Ok(format!("Successfully edited file '{}'", input.path))
            }
            count => Err(ToolError::validation(format!(
                "string '{}' found multiple times ({}) in file '{}', expected exactly one",
                input.old_str, count, input.path
            ))),
        }
    }
}

// ============ create_file ============

pub struct CreateFileTool {
    sandbox: Sandbox,
}

impl CreateFileTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[derive(Deserialize)]
struct CreateFileInput {
    #[serde(default)]
    path: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> ToolName {
        ToolName::CreateFile
    }

    fn description(&self) -> &str {
        "Create a new file with the specified content at a path relative to the workspace root. \
         Fails if the file already exists or the path is invalid."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The path relative to the workspace where the file should be created (including filename)." },
                "content": { "type": "string", "description": "The content to write to the new file." }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String, ToolError> {
        let input: CreateFileInput = parse_input(self.name(), params)?;
        if input.path.is_empty() {
            return Err(ToolError::validation("path is required for create_file"));
        }
        let path = self.sandbox.resolve(&input.path)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::io(
                    format!("failed to create parent directory for '{}'", input.path),
                    e,
                )
            })?;
        }

        // create_new refuses an existing entry, dangling symlinks included.
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ToolError::validation(format!(
                    "file already exists at path '{}'",
                    input.path
                )))
            }
            Err(e) => {
                return Err(ToolError::io(
                    format!("failed to create file '{}'", input.path),
                    e,
                ))
            }
        };
        file.write_all(input.content.as_bytes())
            .await
            .map_err(|e| ToolError::io(format!("failed to write file '{}'", input.path), e))?;
        file.flush()
            .await
            .map_err(|e| ToolError::io(format!("failed to write file '{}'", input.path), e))?;

        Ok(format!("Successfully created file '{}'", input.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, Sandbox) {
        let tmp = TempDir::new().unwrap();
        let sandbox = Sandbox::new(tmp.path()).unwrap();
        (tmp, sandbox)
    }

    #[tokio::test]
    async fn read_file_returns_contents() {
        let (tmp, sandbox) = sandbox();
        std::fs::write(tmp.path().join("main.go"), "package main\n").unwrap();
        let out = ReadFileTool::new(sandbox)
            .execute(json!({ "path": "main.go" }))
            .await
            .unwrap();
        assert_eq!(out, "package main\n");
    }

    #[tokio::test]
    async fn read_file_rejects_directories_and_missing_files() {
        let (tmp, sandbox) = sandbox();
        std::fs::create_dir(tmp.path().join("pkg")).unwrap();
        let tool = ReadFileTool::new(sandbox);
        let err = tool.execute(json!({ "path": "pkg" })).await.unwrap_err();
        assert!(err.to_string().contains("is a directory"));
        let err = tool.execute(json!({ "path": "nope.txt" })).await.unwrap_err();
        assert!(err.to_string().contains("file not found"));
        let err = tool.execute(json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "path is required for read_file");
    }

    #[tokio::test]
    async fn list_files_marks_directories() {
        let (tmp, sandbox) = sandbox();
        std::fs::create_dir_all(tmp.path().join("pkg/inner")).unwrap();
        std::fs::write(tmp.path().join("main.go"), "").unwrap();
        std::fs::write(tmp.path().join("pkg/util.go"), "").unwrap();
        let tool = ListFilesTool::new(sandbox);

        let root: Vec<String> =
            serde_json::from_str(&tool.execute(json!({})).await.unwrap()).unwrap();
        assert_eq!(root, vec!["main.go", "pkg/"]);

        let nested: Vec<String> =
            serde_json::from_str(&tool.execute(json!({ "path": "pkg" })).await.unwrap()).unwrap();
        assert_eq!(nested, vec!["pkg/inner/", "pkg/util.go"]);
    }

    #[tokio::test]
    async fn list_files_on_empty_dir_is_empty_array() {
        let (_tmp, sandbox) = sandbox();
        let out = ListFilesTool::new(sandbox).execute(Value::Null).await.unwrap();
        assert_eq!(out, "[]");
    }

    #[tokio::test]
    async fn edit_file_replaces_single_match() {
        let (tmp, sandbox) = sandbox();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "hello world").unwrap();
        let out = EditFileTool::new(sandbox)
            .execute(json!({ "path": "a.txt", "old_str": "world", "new_str": "rust" }))
            .await
            .unwrap();
        assert_eq!(out, "Successfully edited file 'a.txt'");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello rust");
    }

    #[tokio::test]
    async fn edit_file_rejects_duplicate_matches() {
        let (tmp, sandbox) = sandbox();
        let file = tmp.path().join("dup.txt");
        std::fs::write(&file, "foo bar foo").unwrap();
        let err = EditFileTool::new(sandbox)
            .execute(json!({ "path": "dup.txt", "old_str": "foo", "new_str": "baz" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
        assert!(err.to_string().contains("found multiple times (2)"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "foo bar foo");
    }

    #[tokio::test]
    async fn edit_file_requires_a_match() {
        let (tmp, sandbox) = sandbox();
        std::fs::write(tmp.path().join("a.txt"), "abc").unwrap();
        let err = EditFileTool::new(sandbox)
            .execute(json!({ "path": "a.txt", "old_str": "xyz", "new_str": "" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found in file"));
    }

    #[tokio::test]
    async fn create_file_makes_parents_and_refuses_overwrite() {
        let (tmp, sandbox) = sandbox();
        let tool = CreateFileTool::new(sandbox);
        tool.execute(json!({ "path": "new/dir/file.txt", "content": "hi" }))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("new/dir/file.txt")).unwrap(),
            "hi"
        );
        let err = tool
            .execute(json!({ "path": "new/dir/file.txt", "content": "again" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn create_file_never_follows_a_dangling_symlink_out() {
        let (tmp, sandbox) = sandbox();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("pwned.txt");
        std::os::unix::fs::symlink(&target, tmp.path().join("link")).unwrap();

        let tool = CreateFileTool::new(sandbox);
        let err = tool
            .execute(json!({ "path": "link", "content": "x" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside the workspace"));
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn create_file_refuses_an_existing_dangling_symlink() {
        let (tmp, sandbox) = sandbox();
        std::os::unix::fs::symlink("missing.txt", tmp.path().join("alias.txt")).unwrap();

        let tool = CreateFileTool::new(sandbox);
        let err = tool
            .execute(json!({ "path": "alias.txt", "content": "x" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(!tmp.path().join("missing.txt").exists());
    }
}
