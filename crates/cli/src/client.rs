use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use tokio_tungstenite::tungstenite::Message;

/// How a subcommand turns response payloads into terminal output.
pub enum Render {
    /// Success is silent (index, unindex).
    Quiet,
    /// A single optional location under `target`.
    Target { context: bool },
    /// A list of locations under the given key.
    Locations {
        key: &'static str,
        context: bool,
    },
    /// Symbol names, one per line.
    Names,
    /// The symbol's location, name, kind, and reference list.
    CursorInfo { context: bool },
    /// Dump text, single response or streamed summary lines.
    Dump,
    /// Log lines until the daemon goes away.
    Log,
}

/// One client run prints many locations from few files.
type FileCache = HashMap<String, String>;

/// Sends one request and prints what comes back. Streamed responses keep
/// printing until the terminal `ok` frame; `log` never terminates on its
/// own.
pub async fn run(
    port: u16,
    message: Value,
    render: Render,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("ws://127.0.0.1:{}", port);
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut sink, mut frames) = ws.split();
    sink.send(Message::text(message.to_string())).await?;

    let mut files = FileCache::new();
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        let Message::Text(text) = &frame else {
            continue;
        };
        let response: Value = serde_json::from_str(text.as_str())?;
        match response["error"].as_str().unwrap_or("protocol error") {
            "ok" => {
                print_response(&response, &render, &mut files);
                break;
            }
            "more data" => print_response(&response, &render, &mut files),
            other => return Err(other.into()),
        }
    }
    Ok(())
}

fn print_response(response: &Value, render: &Render, files: &mut FileCache) {
    match render {
        Render::Quiet => {}
        Render::Target { context } => {
            if response["target"].is_object() {
                print_location(&response["target"], "", *context, files);
            }
        }
        Render::Locations { key, context } => {
            if let Some(list) = response[*key].as_array() {
                for location in list {
                    print_location(location, "", *context, files);
                }
            }
        }
        Render::Names => {
            if let Some(names) = response["symbolNames"].as_array() {
                for name in names.iter().filter_map(Value::as_str) {
                    println!("{}", name);
                }
            }
        }
        Render::CursorInfo { context } => {
            let info = &response["cursorInfo"];
            if !info.is_object() {
                return;
            }
            print_location(&info["location"], "", *context, files);
            let kind = if info["definition"].as_bool().unwrap_or(false) {
                "Definition"
            } else {
                "Reference"
            };
            println!("Name: {} {}", info["name"].as_str().unwrap_or("?"), kind);
            if let Some(references) = info["references"].as_array() {
                if !references.is_empty() {
                    println!("References:");
                    for location in references {
                        print_location(location, "  ", *context, files);
                    }
                }
            }
        }
        Render::Dump => {
            if let Some(text) = response["dump"].as_str() {
                println!("{}", text);
            }
        }
        Render::Log => {
            if let Some(line) = response["log"].as_str() {
                println!("{}", line);
            }
        }
    }
}

/// Wire locations carry `offset`; the locations inside a cursor-info symbol
/// carry `start`. Either way the line reads `file,offset`, with the source
/// line appended after a tab when context is on.
fn print_location(location: &Value, header: &str, context: bool, files: &mut FileCache) {
    let Some(file) = location["file"].as_str() else {
        return;
    };
    let offset = location["offset"].as_u64().or_else(|| location["start"].as_u64());
    let Some(offset) = offset else {
        return;
    };
    let mut out = format!("{}{},{}", header, file, offset);
    if context {
        if let Some(line) = context_line(file, offset as usize, files) {
            out.push('\t');
            out.push_str(line.trim_end());
        }
    }
    println!("{}", out);
}

/// The source line containing `offset`, read back from the file itself.
fn context_line(file: &str, offset: usize, files: &mut FileCache) -> Option<String> {
    if !files.contains_key(file) {
        let text = std::fs::read_to_string(file).ok()?;
        files.insert(file.to_string(), text);
    }
    let text = files.get(file)?;
    let offset = offset.min(text.len());
    let start = text[..offset].rfind('\n').map(|pos| pos + 1).unwrap_or(0);
    let end = text[offset..]
        .find('\n')
        .map(|pos| offset + pos)
        .unwrap_or(text.len());
    Some(text[start..end].to_string())
}
