//! Pure translations between source files, their test modules and their
//! importable module names.
//!
//! Layout: `src/<project>/<dirs>/<module>.py` is tested by
//! `src/tests/<test_type>/<dirs>/test_<module>.py`. Nothing here touches the
//! filesystem.

use tracing::debug;

use crate::error::PathError;

/// Split a path into normalized components, dropping `.` and empty segments.
fn components(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect()
}

fn join(absolute: bool, parts: &[&str]) -> String {
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

fn src_index(path: &str, parts: &[&str]) -> Result<usize, PathError> {
    parts
        .iter()
        .position(|part| *part == "src")
        .ok_or_else(|| PathError::MissingSrc {
            path: path.to_string(),
        })
}

fn require_python(file_name: &str) -> Result<(), PathError> {
    if file_name.ends_with(".py") {
        Ok(())
    } else {
        Err(PathError::NotPython {
            file_name: file_name.to_string(),
        })
    }
}

/// Test module path for a source file.
///
/// `src/mcp_qa/tools/testing/models.py` with `unit` becomes
/// `src/tests/unit/tools/testing/test_models.py`.
pub fn source_to_test_path(source_path: &str, test_type: &str) -> Result<String, PathError> {
    if source_path.trim().is_empty() {
        return Err(PathError::Empty { kind: "Source" });
    }

    let parts = components(source_path);
    let src = src_index(source_path, &parts)?;
    if parts.len() <= src + 1 {
        return Err(PathError::Layout {
            path: source_path.to_string(),
            reason: "no project directory after 'src'".to_string(),
        });
    }

    let file_name = parts[parts.len() - 1];
    require_python(file_name)?;

    // Skip `src` and the project directory.
    let remaining = &parts[src + 2..];
    if remaining.is_empty() {
        return Err(PathError::Layout {
            path: source_path.to_string(),
            reason: "no module inside the project directory".to_string(),
        });
    }

    let stem = file_name.trim_end_matches(".py");
    let test_file = format!("test_{}.py", stem);

    let mut new_parts: Vec<&str> = parts[..=src].to_vec();
    new_parts.push("tests");
    new_parts.push(test_type);
    new_parts.extend_from_slice(&remaining[..remaining.len() - 1]);
    new_parts.push(&test_file);

    let test_path = join(source_path.starts_with('/'), &new_parts);
    debug!(source = %source_path, test = %test_path, "Source path translated");
    Ok(test_path)
}

/// Source file path for a test module, the inverse of [`source_to_test_path`].
///
/// The project directory cannot be recovered from the test path, so the
/// caller names it.
pub fn test_to_source_path(
    test_path: &str,
    test_type: &str,
    project: &str,
) -> Result<String, PathError> {
    if test_path.trim().is_empty() {
        return Err(PathError::Empty { kind: "Test" });
    }

    let parts = components(test_path);
    let src = src_index(test_path, &parts)?;

    if parts.get(src + 1) != Some(&"tests") {
        return Err(PathError::Layout {
            path: test_path.to_string(),
            reason: "expected src/tests/...".to_string(),
        });
    }
    if parts.get(src + 2) != Some(&test_type) {
        return Err(PathError::Layout {
            path: test_path.to_string(),
            reason: format!("no '{}' directory after 'tests'", test_type),
        });
    }
    if parts.len() <= src + 3 {
        return Err(PathError::Layout {
            path: test_path.to_string(),
            reason: "no test module".to_string(),
        });
    }

    let file_name = parts[parts.len() - 1];
    require_python(file_name)?;
    let Some(source_file) = file_name.strip_prefix("test_") else {
        return Err(PathError::Layout {
            path: test_path.to_string(),
            reason: format!("test filename must start with 'test_', got '{}'", file_name),
        });
    };

    let mut source_parts: Vec<&str> = parts[..=src].to_vec();
    source_parts.push(project);
    source_parts.extend_from_slice(&parts[src + 3..parts.len() - 1]);
    source_parts.push(source_file);

    let source_path = join(test_path.starts_with('/'), &source_parts);
    debug!(test = %test_path, source = %source_path, "Test path translated");
    Ok(source_path)
}

/// Dotted module name for a source file, as coverage expects it.
///
/// A package's `__init__.py` maps to the package itself.
pub fn source_to_module_path(source_path: &str) -> Result<String, PathError> {
    if source_path.trim().is_empty() {
        return Err(PathError::Empty { kind: "Source" });
    }

    let parts = components(source_path);
    let src = src_index(source_path, &parts)?;
    if parts.len() <= src + 1 {
        return Err(PathError::Layout {
            path: source_path.to_string(),
            reason: "no project directory after 'src'".to_string(),
        });
    }

    let file_name = parts[parts.len() - 1];
    require_python(file_name)?;

    let mut module_parts: Vec<&str> = parts[src + 1..parts.len() - 1].to_vec();
    if file_name != "__init__.py" {
        module_parts.push(file_name.trim_end_matches(".py"));
    }

    Ok(module_parts.join("."))
}
