//! File manager tool: read, write, delete, append, move, copy and list.
//!
//! Takes `{"operation": "...", "args": {...}}`. Every filesystem outcome is
//! reported as a `SUCCESS` / `WARNING` / `ERROR` observation; only a
//! malformed argument shape is a tool error. Reads and listings are
//! truncated so a large file cannot flood the model's context.

use ponder_core::error::ToolError;
use ponder_core::tool::{BlockingTool, ToolResult};
use serde_json::{Map, Value};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const OPERATIONS: &str = "read, write, delete, append, move, copy, list";

pub struct FileManagerTool {
    read_limit: usize,
    list_limit: usize,
}

impl FileManagerTool {
    pub fn new(read_limit: usize, list_limit: usize) -> Self {
        Self {
            read_limit,
            list_limit,
        }
    }

    fn dispatch(&self, operation: &str, args: &Map<String, Value>) -> Result<String, String> {
        let outcome = match operation {
            "read" => read_file(Path::new(str_arg(args, "file_path")?), self.read_limit),
            "write" => write_file(Path::new(str_arg(args, "file_path")?), str_arg(args, "content")?),
            "delete" => delete_path(Path::new(str_arg(args, "path")?)),
            "append" => append_file(Path::new(str_arg(args, "file_path")?), str_arg(args, "content")?),
            "move" => move_path(
                Path::new(str_arg(args, "src_path")?),
                Path::new(str_arg(args, "dest_path")?),
            ),
            "copy" => copy_file(
                Path::new(str_arg(args, "src_path")?),
                Path::new(str_arg(args, "dest_path")?),
            ),
            "list" => {
                let extensions: Vec<String> = match args.get("extensions") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    Some(_) => return Err("'extensions' must be a list of strings".into()),
                };
                list_dir(Path::new(str_arg(args, "directory_path")?), &extensions, self.list_limit)
            }
            other => format!("ERROR: Invalid operation '{other}'. Must be one of: {OPERATIONS}."),
        };
        Ok(outcome)
    }
}

impl BlockingTool for FileManagerTool {
    fn name(&self) -> &str {
        "file_manager"
    }

    fn description(&self) -> &str {
        "Manages file system operations. Input: a JSON object {\"operation\": ..., \"args\": {...}} where \
         operation is one of read, write, delete, append, move, copy, list and args are: \
         read {file_path}; write {file_path, content}; delete {path}; append {file_path, content}; \
         move {src_path, dest_path}; copy {src_path, dest_path}; list {directory_path, extensions (optional list)}."
    }

    fn run(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let Value::Object(map) = &arguments else {
            return Err(ToolError::InvalidArguments(
                "file_manager expects a JSON object with 'operation' and 'args'".into(),
            ));
        };
        let operation = map
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'operation' field".into()))?;
        let empty = Map::new();
        let args = match map.get("args") {
            Some(Value::Object(args)) => args,
            None | Some(Value::Null) => &empty,
            Some(_) => {
                return Err(ToolError::InvalidArguments("'args' must be a JSON object".into()));
            }
        };

        let op = operation.trim().to_lowercase();
        debug!(operation = %op, "file_manager");

        let output = self.dispatch(&op, args).unwrap_or_else(|details| {
            format!(
                "ERROR: Missing or incorrect arguments for operation '{operation}'. Details: {details}. \
                 Check the required 'args' object in the tool description."
            )
        });

        Ok(ToolResult {
            success: output.starts_with("SUCCESS"),
            output,
            data: None,
        })
    }
}

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(format!("'{key}' must be a string")),
        None => Err(format!("missing '{key}'")),
    }
}

fn read_file(path: &Path, limit: usize) -> String {
    let p = path.display();
    if !path.exists() {
        return format!("ERROR: File not found at '{p}'.");
    }
    if path.is_dir() {
        return format!("ERROR: Path '{p}' is a directory. Use 'list' operation.");
    }

    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return format!("ERROR: Permission denied when trying to read '{p}'.");
        }
        Err(e) => return format!("ERROR reading file '{p}': {e}"),
    };
    if bytes.is_empty() {
        return format!("SUCCESS: Read file '{p}'. The file is [EMPTY].");
    }
    let Ok(content) = String::from_utf8(bytes) else {
        return format!("ERROR: File '{p}' is not UTF-8 text-readable. It may be a binary file.");
    };

    if content.chars().count() > limit {
        let truncated: String = content.chars().take(limit).collect();
        format!("SUCCESS: Read file '{p}'. Content [TRUNCATED] to {limit} chars:\n{truncated}...")
    } else {
        format!("SUCCESS: Read file '{p}'. Content:\n{content}")
    }
}

fn write_file(path: &Path, content: &str) -> String {
    let p = path.display();
    if path.is_dir() {
        return format!("ERROR writing to file: '{p}' is an existing directory, not a file.");
    }

    let result = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::write(path, content));
    if let Err(e) = result {
        return format!("ERROR writing to file '{p}': {e}");
    }

    let Ok(meta) = fs::metadata(path) else {
        return format!(
            "ERROR writing to file '{p}': Write reported success, but the file was NOT found during verification."
        );
    };
    let expected = content.chars().count();
    if meta.len() == 0 && expected > 0 {
        return format!(
            "WARNING writing to file '{p}': File was created, but size is 0 bytes. Expected {expected} characters."
        );
    }

    format!(
        "SUCCESS: File '{p}' successfully CREATED/OVERWRITTEN. Verified size: {} bytes (Expected: {expected} chars).",
        meta.len()
    )
}

fn delete_path(path: &Path) -> String {
    let p = path.display();
    let (kind, result) = if path.is_dir() {
        ("directory", fs::remove_dir_all(path))
    } else if path.is_file() {
        ("file", fs::remove_file(path))
    } else {
        return format!("WARNING: No file or directory found at path: '{p}'. Nothing was deleted.");
    };

    if let Err(e) = result {
        return format!("ERROR deleting '{p}': {e}");
    }
    if path.exists() {
        return format!("ERROR deleting {kind} '{p}': Deletion reported success, but the {kind} still EXISTS.");
    }
    format!("SUCCESS: Successfully deleted {kind}: '{p}'. Verified ABSENT on filesystem.")
}

fn append_file(path: &Path, content: &str) -> String {
    let p = path.display();
    if !path.exists() {
        return format!("ERROR: File not found at '{p}'. Use 'write' operation to create it first.");
    }
    if path.is_dir() {
        return format!("ERROR: Path '{p}' is a directory. Cannot append.");
    }

    let before = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let result = fs::OpenOptions::new()
        .append(true)
        .open(path)
        .and_then(|mut f| f.write_all(content.as_bytes()));
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return format!("ERROR: Permission denied when appending to '{p}'.");
        }
        Err(e) => return format!("ERROR appending to file '{p}': {e}"),
    }
    let after = fs::metadata(path).map(|m| m.len()).unwrap_or(before);

    format!(
        "SUCCESS: Appended {} characters (verified {} bytes) to '{p}'. New size: {after} bytes.",
        content.chars().count(),
        after.saturating_sub(before)
    )
}

/// Where `src` lands when moved or copied to `dest`.
fn final_destination(src: &Path, dest: &Path) -> PathBuf {
    match (dest.is_dir(), src.file_name()) {
        (true, Some(name)) => dest.join(name),
        _ => dest.to_path_buf(),
    }
}

fn move_path(src: &Path, dest: &Path) -> String {
    let (s, d) = (src.display(), dest.display());
    if !src.exists() {
        return format!("ERROR: Source path '{s}' does not exist. Nothing to move.");
    }

    let dest_is_dir = dest.is_dir();
    let dest_existed = dest.exists();
    let target = final_destination(src, dest);
    let target_existed = target.exists();

    let result = fs::rename(src, &target).or_else(|e| {
        // rename fails across filesystems; files can still be copied over
        if src.is_file() {
            fs::copy(src, &target).and_then(|_| fs::remove_file(src))
        } else {
            Err(e)
        }
    });
    if let Err(e) = result {
        return format!("ERROR moving file from '{s}' to '{d}': {e}");
    }

    if src.exists() {
        return format!("ERROR: Move failed. Source path '{s}' still exists after operation.");
    }
    if !target.exists() {
        return format!(
            "ERROR: Move failed. Destination path '{}' was not found after operation.",
            target.display()
        );
    }

    if dest_is_dir {
        let mut msg = format!("SUCCESS: Moved '{s}' INTO directory '{d}'.");
        if target_existed {
            msg.push_str(" (Overwrote existing item inside directory)");
        }
        msg
    } else if dest_existed {
        format!("SUCCESS: Moved '{s}' to '{d}', OVERWRITING the existing file.")
    } else {
        format!("SUCCESS: Moved/Renamed '{s}' to '{d}'.")
    }
}

fn copy_file(src: &Path, dest: &Path) -> String {
    let (s, d) = (src.display(), dest.display());
    if !src.exists() {
        return format!("ERROR: Source path '{s}' does not exist. Nothing to copy.");
    }
    if src.is_dir() {
        return format!("ERROR: Source path '{s}' is a directory. This operation only copies single files.");
    }
    if !src.is_file() {
        return format!("ERROR: Source path '{s}' is not a file.");
    }

    let dest_is_dir = dest.is_dir();
    let dest_existed = dest.exists();
    let target = final_destination(src, dest);
    let target_existed = target.exists();

    if let Err(e) = fs::copy(src, &target) {
        return format!("ERROR copying file '{s}' to '{d}': {e}");
    }
    if !target.exists() {
        return format!(
            "ERROR: Copy failed. Destination file '{}' was not found after operation.",
            target.display()
        );
    }

    if dest_is_dir {
        let mut msg = format!("SUCCESS: Copied '{s}' INTO directory '{d}'.");
        if target_existed {
            msg.push_str(" (Overwrote existing file inside directory)");
        }
        msg
    } else if dest_existed {
        format!("SUCCESS: Copied '{s}' to '{d}', OVERWRITING the existing file.")
    } else {
        format!("SUCCESS: Copied '{s}' to '{d}'.")
    }
}

fn list_dir(path: &Path, extensions: &[String], limit: usize) -> String {
    let p = path.display();
    if !path.exists() {
        return format!("ERROR: Directory not found at '{p}'.");
    }
    if !path.is_dir() {
        return format!("ERROR: Path '{p}' is a file, not a directory. Use 'read' operation.");
    }

    let mut entries: Vec<_> = match fs::read_dir(path) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return format!("ERROR: Permission denied when listing directory '{p}'.");
        }
        Err(e) => return format!("ERROR listing directory '{p}': {e}"),
    };
    entries.sort_by_key(|e| e.file_name());

    let mut directories: Vec<String> = Vec::new();
    let mut files: Vec<String> = Vec::new();
    for entry in entries {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if directories.len() + files.len() >= limit {
            let marker = format!("... [TRUNCATED at {limit} items]");
            if is_dir {
                directories.push(marker);
            } else {
                files.push(marker);
            }
            break;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if is_dir {
            directories.push(name);
        } else if extensions.is_empty() || extensions.iter().any(|ext| name.ends_with(ext.as_str())) {
            files.push(name);
        }
    }

    let listing = serde_json::json!({ "directories": directories, "files": files });
    format!("SUCCESS: Contents of '{p}': {listing}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> FileManagerTool {
        FileManagerTool::new(10_000, 100)
    }

    fn run(tool: &FileManagerTool, arguments: Value) -> String {
        tool.run(arguments).unwrap().output
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested/notes.txt");
        let path = file.to_str().unwrap();

        let out = run(&tool(), json!({"operation": "write", "args": {"file_path": path, "content": "hello"}}));
        assert!(out.starts_with("SUCCESS: File"), "{out}");
        assert!(out.contains("Verified size: 5 bytes"));

        let out = run(&tool(), json!({"operation": "read", "args": {"file_path": path}}));
        assert!(out.ends_with("Content:\nhello"), "{out}");
    }

    #[test]
    fn read_truncates_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.txt");
        std::fs::write(&file, "abcdefghij").unwrap();

        let small = FileManagerTool::new(4, 100);
        let out = run(&small, json!({"operation": "read", "args": {"file_path": file.to_str().unwrap()}}));
        assert!(out.contains("[TRUNCATED] to 4 chars:\nabcd..."), "{out}");
    }

    #[test]
    fn read_empty_missing_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "").unwrap();

        let out = run(&tool(), json!({"operation": "read", "args": {"file_path": empty.to_str().unwrap()}}));
        assert!(out.contains("[EMPTY]"));

        let missing = dir.path().join("nope.txt");
        let out = run(&tool(), json!({"operation": "read", "args": {"file_path": missing.to_str().unwrap()}}));
        assert!(out.starts_with("ERROR: File not found"));

        let out = run(&tool(), json!({"operation": "read", "args": {"file_path": dir.path().to_str().unwrap()}}));
        assert!(out.contains("is a directory"));
    }

    #[test]
    fn read_binary_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blob.bin");
        std::fs::write(&file, [0xff, 0xfe, 0x00]).unwrap();
        let out = run(&tool(), json!({"operation": "read", "args": {"file_path": file.to_str().unwrap()}}));
        assert!(out.contains("not UTF-8"));
    }

    #[test]
    fn append_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("log.txt");
        let path = file.to_str().unwrap();

        let out = run(&tool(), json!({"operation": "append", "args": {"file_path": path, "content": "x"}}));
        assert!(out.starts_with("ERROR: File not found"));

        std::fs::write(&file, "ab").unwrap();
        let out = run(&tool(), json!({"operation": "append", "args": {"file_path": path, "content": "cd"}}));
        assert!(out.contains("New size: 4 bytes"), "{out}");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "abcd");
    }

    #[test]
    fn delete_file_directory_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        let sub = dir.path().join("sub");
        std::fs::write(&file, "a").unwrap();
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("inner.txt"), "b").unwrap();

        let out = run(&tool(), json!({"operation": "delete", "args": {"path": file.to_str().unwrap()}}));
        assert!(out.starts_with("SUCCESS: Successfully deleted file"));
        let out = run(&tool(), json!({"operation": "delete", "args": {"path": sub.to_str().unwrap()}}));
        assert!(out.starts_with("SUCCESS: Successfully deleted directory"));
        assert!(!sub.exists());

        let out = run(&tool(), json!({"operation": "delete", "args": {"path": file.to_str().unwrap()}}));
        assert!(out.starts_with("WARNING"));
    }

    #[test]
    fn move_into_directory_and_rename() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dest_dir = dir.path().join("archive");
        std::fs::write(&src, "a").unwrap();
        std::fs::create_dir(&dest_dir).unwrap();

        let out = run(&tool(), json!({"operation": "move", "args": {
            "src_path": src.to_str().unwrap(),
            "dest_path": dest_dir.to_str().unwrap(),
        }}));
        assert!(out.contains("INTO directory"), "{out}");
        let moved = dest_dir.join("a.txt");
        assert!(moved.exists());
        assert!(!src.exists());

        let renamed = dir.path().join("b.txt");
        let out = run(&tool(), json!({"operation": "move", "args": {
            "src_path": moved.to_str().unwrap(),
            "dest_path": renamed.to_str().unwrap(),
        }}));
        assert!(out.starts_with("SUCCESS: Moved/Renamed"), "{out}");
    }

    #[test]
    fn copy_overwrites_and_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dest = dir.path().join("b.txt");
        std::fs::write(&src, "new").unwrap();
        std::fs::write(&dest, "old").unwrap();

        let out = run(&tool(), json!({"operation": "copy", "args": {
            "src_path": src.to_str().unwrap(),
            "dest_path": dest.to_str().unwrap(),
        }}));
        assert!(out.contains("OVERWRITING"), "{out}");
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new");
        assert!(src.exists());

        let out = run(&tool(), json!({"operation": "copy", "args": {
            "src_path": dir.path().to_str().unwrap(),
            "dest_path": dest.to_str().unwrap(),
        }}));
        assert!(out.contains("is a directory"));
    }

    #[test]
    fn list_filters_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::write(dir.path().join("b.md"), "").unwrap();
        let path = dir.path().to_str().unwrap();

        let out = run(&tool(), json!({"operation": "list", "args": {"directory_path": path, "extensions": [".rs"]}}));
        assert!(out.contains(r#""directories":["src"]"#), "{out}");
        assert!(out.contains(r#""files":["a.rs"]"#), "{out}");

        let tiny = FileManagerTool::new(10_000, 1);
        let out = run(&tiny, json!({"operation": "list", "args": {"directory_path": path}}));
        assert!(out.contains("[TRUNCATED at 1 items]"), "{out}");
    }

    #[test]
    fn invalid_operation_and_missing_args_are_observations() {
        let out = run(&tool(), json!({"operation": "explode", "args": {}}));
        assert!(out.starts_with("ERROR: Invalid operation 'explode'"));

        let result = tool().run(json!({"operation": "write", "args": {"file_path": "x"}})).unwrap();
        assert!(!result.success);
        assert!(result.output.contains("missing 'content'"));
    }

    #[test]
    fn malformed_shape_is_tool_error() {
        assert!(matches!(
            tool().run(json!("read /etc/passwd")),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool().run(json!({"args": {}})),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool().run(json!({"operation": "read", "args": "x"})),
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
