//! 文件查看与编辑工具（str_replace_based_edit_tool）
//!
//! 命令：view（文件带行号 / 目录两层）、create（不覆盖已有文件）、str_replace（旧文本必须唯一）、
//! insert（在第 N 行之后插入）。所有路径限制在工作区根目录内。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::llm::ToolArguments;
use crate::tools::schema::{parameters_of, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolExecResult, ToolParameter};

/// 编辑结果片段前后保留的行数
const SNIPPET_LINES: usize = 4;

const DESCRIPTION: &str = "Custom editing tool for viewing, creating and editing files
* State is persistent across command calls and discussions with the user
* If `path` is a file, `view` displays the result of applying `cat -n`. If `path` is a directory, `view` lists non-hidden files and directories up to 2 levels deep
* The `create` command cannot be used if the specified `path` already exists as a file
* The `old_str` parameter should match EXACTLY one or more consecutive lines from the original file. Be mindful of whitespaces!
* If the `old_str` parameter is not unique in the file, the replacement will not be performed. Make sure to include enough context in `old_str` to make it unique
* The `new_str` parameter should contain the edited lines that should replace the `old_str`
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
enum EditCommand {
    View,
    Create,
    StrReplace,
    Insert,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EditArgs {
    /// The commands to run. Allowed options are: `view`, `create`, `str_replace`, `insert`.
    command: EditCommand,
    /// Path to file or directory, absolute or relative to the project root.
    path: String,
    /// Required parameter of `create` command, with the content of the file to be created.
    file_text: Option<String>,
    /// Required parameter of `str_replace` command containing the string in `path` to replace.
    old_str: Option<String>,
    /// Optional parameter of `str_replace` command containing the new string (if not given, no string will be added). Required parameter of `insert` command containing the string to insert.
    new_str: Option<String>,
    /// Required parameter of `insert` command. The `new_str` will be inserted AFTER the line `insert_line` of `path`.
    insert_line: Option<usize>,
    /// Optional parameter of `view` command when `path` points to a file. [start_line, end_line], 1-indexed; end_line -1 shows all lines from start_line.
    view_range: Option<Vec<i64>>,
}

/// 编辑工具
pub struct EditTool {
    root: PathBuf,
}

impl EditTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            root: ctx.workspace_root.clone(),
        }
    }

    /// 相对路径基于工作区根目录；越界（含 .. 与符号链接）拒绝
    fn resolve_path(&self, raw: &str) -> Result<PathBuf, ToolError> {
        let path = Path::new(raw);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let normalized = normalize(&joined);
        let resolved = normalized.canonicalize().unwrap_or_else(|_| normalized.clone());

        let root = normalize(&self.root);
        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.clone());
        if resolved.starts_with(&canonical_root) || resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            Err(ToolError::InvalidArguments(format!(
                "Access denied: path '{raw}' is outside the project root"
            )))
        }
    }

    async fn view(&self, path: &Path, view_range: Option<&[i64]>) -> Result<String, ToolError> {
        if path.is_dir() {
            if view_range.is_some() {
                return Err(ToolError::InvalidArguments(
                    "The `view_range` parameter is not allowed when `path` points to a directory."
                        .into(),
                ));
            }
            return Ok(list_dir(path));
        }
        let content = read_file(path).await?;
        let lines: Vec<&str> = content.lines().collect();
        let (start, end) = match view_range {
            None => (1, lines.len()),
            Some(range) => parse_view_range(range, lines.len())?,
        };
        let shown = if lines.is_empty() {
            String::new()
        } else {
            numbered(&lines[start - 1..end], start)
        };
        Ok(format!(
            "Here's the result of running `cat -n` on {}:\n{}",
            path.display(),
            shown
        ))
    }

    async fn create(&self, path: &Path, file_text: Option<String>) -> Result<String, ToolError> {
        let text = file_text.ok_or_else(|| {
            ToolError::InvalidArguments("Parameter `file_text` is required for command: create".into())
        })?;
        if path.exists() {
            return Err(ToolError::Execution(format!(
                "File already exists at: {}. Cannot overwrite files using command `create`.",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, text).await?;
        Ok(format!("File created successfully at: {}", path.display()))
    }

    async fn str_replace(
        &self,
        path: &Path,
        old_str: Option<String>,
        new_str: Option<String>,
    ) -> Result<String, ToolError> {
        let old = old_str.ok_or_else(|| {
            ToolError::InvalidArguments("Parameter `old_str` is required for command: str_replace".into())
        })?;
        if old.is_empty() {
            return Err(ToolError::InvalidArguments("`old_str` must not be empty".into()));
        }
        let new = new_str.unwrap_or_default();
        let content = read_file(path).await?;

        let positions: Vec<usize> = content.match_indices(&old).map(|(i, _)| i).collect();
        match positions.as_slice() {
            [] => Err(ToolError::Execution(format!(
                "No replacement was performed, old_str `{}` did not appear verbatim in {}.",
                old,
                path.display()
            ))),
            [pos] => {
                let updated = format!("{}{}{}", &content[..*pos], new, &content[pos + old.len()..]);
                tokio::fs::write(path, &updated).await?;
                let edit_line = content[..*pos].matches('\n').count() + 1;
                let snippet = snippet_around(&updated, edit_line, new.matches('\n').count());
                Ok(format!(
                    "The file {} has been edited. Here's the result of running `cat -n` on a snippet:\n{}\nReview the changes and make sure they are as expected.",
                    path.display(),
                    snippet
                ))
            }
            many => {
                let lines: Vec<String> = many
                    .iter()
                    .map(|p| (content[..*p].matches('\n').count() + 1).to_string())
                    .collect();
                Err(ToolError::Execution(format!(
                    "No replacement was performed. Multiple occurrences of old_str `{}` in lines [{}]. Please ensure it is unique",
                    old,
                    lines.join(", ")
                )))
            }
        }
    }

    async fn insert(
        &self,
        path: &Path,
        insert_line: Option<usize>,
        new_str: Option<String>,
    ) -> Result<String, ToolError> {
        let line = insert_line.ok_or_else(|| {
            ToolError::InvalidArguments("Parameter `insert_line` is required for command: insert".into())
        })?;
        let text = new_str.ok_or_else(|| {
            ToolError::InvalidArguments("Parameter `new_str` is required for command: insert".into())
        })?;
        let content = read_file(path).await?;
        let mut lines: Vec<&str> = content.lines().collect();
        if line > lines.len() {
            return Err(ToolError::InvalidArguments(format!(
                "Invalid `insert_line` parameter: {}. It should be within the range of lines of the file: [0, {}]",
                line,
                lines.len()
            )));
        }
        let inserted: Vec<&str> = text.lines().collect();
        let inserted_count = inserted.len();
        lines.splice(line..line, inserted);
        let mut updated = lines.join("\n");
        if content.ends_with('\n') || content.is_empty() {
            updated.push('\n');
        }
        tokio::fs::write(path, &updated).await?;
        let snippet = snippet_around(&updated, line + 1, inserted_count.saturating_sub(1));
        Ok(format!(
            "The file {} has been edited. Here's the result of running `cat -n` on a snippet:\n{}\nReview the changes and make sure they are as expected.",
            path.display(),
            snippet
        ))
    }
}

/// 词法规整：去掉 `.`，`..` 回退一级
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

async fn read_file(path: &Path) -> Result<String, ToolError> {
    if !path.is_file() {
        return Err(ToolError::Execution(format!(
            "The path {} does not exist or is not a file.",
            path.display()
        )));
    }
    Ok(tokio::fs::read_to_string(path).await?)
}

fn parse_view_range(range: &[i64], total: usize) -> Result<(usize, usize), ToolError> {
    let invalid = |msg: String| ToolError::InvalidArguments(format!("Invalid `view_range`: {msg}"));
    let [start, end] = range else {
        return Err(invalid("it should be a list of two integers".into()));
    };
    if *start < 1 || *start as usize > total.max(1) {
        return Err(invalid(format!("start line {start} should be within [1, {total}]")));
    }
    let start = *start as usize;
    let end = match *end {
        -1 => total,
        e if e < start as i64 => {
            return Err(invalid(format!("end line {e} should not be smaller than start line {start}")))
        }
        e if e as usize > total => {
            return Err(invalid(format!("end line {e} should not be larger than the number of lines {total}")))
        }
        e => e as usize,
    };
    Ok((start, end))
}

fn numbered(lines: &[&str], first_line: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:6}\t{}", i + first_line, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 编辑位置前后各 SNIPPET_LINES 行
fn snippet_around(content: &str, edit_line: usize, extra_lines: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = edit_line.saturating_sub(SNIPPET_LINES).max(1);
    let end = (edit_line + extra_lines + SNIPPET_LINES).min(lines.len());
    if start > end {
        return String::new();
    }
    numbered(&lines[start - 1..end], start)
}

/// 列出两层以内的非隐藏文件与目录
fn list_dir(path: &Path) -> String {
    let entries: Vec<String> = WalkDir::new(path)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(Result::ok)
        .map(|e| e.path().display().to_string())
        .collect();
    format!(
        "Here's the files and directories up to 2 levels deep in {}, excluding hidden items:\n{}\n",
        path.display(),
        entries.join("\n")
    )
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "str_replace_based_edit_tool"
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        parameters_of::<EditArgs>()
    }

    async fn execute(&self, args: &ToolArguments) -> Result<ToolExecResult, ToolError> {
        let args: EditArgs = parse_args(args)?;
        let path = self.resolve_path(&args.path)?;
        let output = match args.command {
            EditCommand::View => self.view(&path, args.view_range.as_deref()).await?,
            EditCommand::Create => self.create(&path, args.file_text).await?,
            EditCommand::StrReplace => self.str_replace(&path, args.old_str, args.new_str).await?,
            EditCommand::Insert => self.insert(&path, args.insert_line, args.new_str).await?,
        };
        Ok(ToolExecResult::ok(output))
    }
}
