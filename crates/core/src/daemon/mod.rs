//! The indexing daemon. A single dispatcher task owns every Database and
//! consumes one event queue, so requests and file-change notifications are
//! handled strictly in arrival order and never observe a half-built index.

pub mod manifest;
pub mod watch;

use crate::database::Database;
use crate::error::JscopeError;
use crate::indexer::Indexer;
use crate::model::Location;
use crate::preprocess;
use crate::protocol::{ClientMessage, Envelope, ErrorCode, WireLocation};
use manifest::Manifest;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use watch::WatchPool;

pub enum DaemonEvent {
    Request {
        message: ClientMessage,
        reply: Responder,
    },
    FileChanged(PathBuf),
}

/// The write half of one connection, tagged with the request type so every
/// frame sent through it echoes that type back.
#[derive(Clone)]
pub struct Responder {
    kind: String,
    tx: mpsc::UnboundedSender<String>,
}

impl Responder {
    pub fn new(kind: impl Into<String>, tx: mpsc::UnboundedSender<String>) -> Responder {
        Responder {
            kind: kind.into(),
            tx,
        }
    }

    fn send(&self, payload: Map<String, Value>) {
        let _ = self
            .tx
            .send(Envelope::ok(Some(self.kind.clone()), payload).to_json());
    }

    fn send_error(&self, code: ErrorCode) {
        let _ = self
            .tx
            .send(Envelope::error(Some(self.kind.clone()), code).to_json());
    }

    fn send_chunk(&self, payload: Map<String, Value>) {
        let _ = self
            .tx
            .send(Envelope::chunk(Some(self.kind.clone()), payload).to_json());
    }
}

/// Cheap cloneable sender for feeding the dispatcher.
#[derive(Clone)]
pub struct DaemonHandle {
    tx: mpsc::UnboundedSender<DaemonEvent>,
}

impl DaemonHandle {
    pub fn request(&self, message: ClientMessage, reply: Responder) {
        let _ = self.tx.send(DaemonEvent::Request { message, reply });
    }
}

pub struct Daemon {
    databases: HashMap<PathBuf, Database>,
    watches: WatchPool,
    manifest: Manifest,
    rx: mpsc::UnboundedReceiver<DaemonEvent>,
}

impl Daemon {
    pub fn new(manifest: Manifest) -> crate::Result<(Daemon, DaemonHandle)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watches = WatchPool::new(tx.clone())?;
        let daemon = Daemon {
            databases: HashMap::new(),
            watches,
            manifest,
            rx,
        };
        Ok((daemon, DaemonHandle { tx }))
    }

    /// Re-index files recorded by a previous run. Runs before the event
    /// loop, so no request can observe a partially replayed state.
    pub async fn replay(&mut self, files: Vec<PathBuf>) {
        for file in files {
            tracing::info!("replaying index of {}", file.display());
            self.index_file(file, None).await;
        }
    }

    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.handle_event(event).await;
        }
    }

    async fn handle_event(&mut self, event: DaemonEvent) {
        match event {
            DaemonEvent::Request { message, reply } => self.handle_request(message, reply).await,
            DaemonEvent::FileChanged(path) => self.handle_file_changed(path).await,
        }
    }

    async fn handle_request(&mut self, msg: ClientMessage, reply: Responder) {
        match msg.kind.as_str() {
            "index" => match msg.file {
                Some(file) => self.index_file(file, Some(&reply)).await,
                None => reply.send_error(ErrorCode::MissingFile),
            },
            "unindex" => self.unindex(&msg, &reply),
            "follow-symbol" => self.follow_symbol(&msg, &reply),
            "find-references" => self.find_references(&msg, &reply),
            "cursor-info" => self.cursor_info(&msg, &reply),
            "find-symbol" => self.find_symbol(&msg, &reply),
            "list-symbols" => self.list_symbols(&msg, &reply),
            "dump" => self.dump(&msg, &reply),
            _ => reply.send_error(ErrorCode::UnknownCommand),
        }
    }

    /// Build (or rebuild) the index for `file`. `reply` is absent for
    /// watcher-triggered and replayed runs, which only log their failures.
    async fn index_file(&mut self, file: PathBuf, reply: Option<&Responder>) {
        if let Some(prior) = self.databases.get(&file).map(|db| db.index_time()) {
            let mtime = match std::fs::metadata(&file).and_then(|meta| meta.modified()) {
                Ok(mtime) => mtime,
                Err(err) => {
                    tracing::warn!("stat failed for {}: {}", file.display(), err);
                    if let Some(reply) = reply {
                        reply.send_error(ErrorCode::StatFailure);
                    }
                    return;
                }
            };
            if mtime <= prior {
                if let Some(reply) = reply {
                    reply.send_error(ErrorCode::FileAlreadyIndexed);
                }
                return;
            }
            let previous = self
                .databases
                .get(&file)
                .map(|db| db.source.all_files())
                .unwrap_or_default();
            for path in &previous {
                self.watches.unwatch(path);
            }
        }

        let started = Instant::now();
        let target = file.clone();
        let unit = match tokio::task::spawn_blocking(move || preprocess::preprocess(&target)).await
        {
            Ok(Ok(unit)) => unit,
            Ok(Err(err)) => {
                tracing::warn!("failed to index {}: {}", file.display(), err);
                match reply {
                    Some(reply) => reply.send_error(wire_error(&err)),
                    // keep retrying on the next change
                    None => self.watches.watch(&file),
                }
                return;
            }
            Err(err) => {
                tracing::error!("preprocess task for {} panicked: {}", file.display(), err);
                if let Some(reply) = reply {
                    reply.send_error(ErrorCode::ReadFailure);
                }
                return;
            }
        };

        for path in unit.all_files() {
            self.watches.watch(&path);
        }
        // the acknowledgement goes out before the walk starts
        if let Some(reply) = reply {
            reply.send(Map::new());
        }

        let db = match tokio::task::spawn_blocking(move || Indexer::new(unit).index()).await {
            Ok(Ok(db)) => db,
            Ok(Err(err)) => {
                tracing::warn!("indexing {} failed: {}", file.display(), err);
                return;
            }
            Err(err) => {
                tracing::error!("index task for {} panicked: {}", file.display(), err);
                return;
            }
        };

        tracing::info!(
            "Indexed {} in {} ms: {} symbols, {} symbol names",
            file.display(),
            started.elapsed().as_millis(),
            db.symbols.len(),
            db.symbol_names.len()
        );
        if let Err(err) = self.manifest.add(&file) {
            tracing::warn!("manifest update failed: {}", err);
        }
        self.databases.insert(file, db);
    }

    async fn handle_file_changed(&mut self, path: PathBuf) {
        let affected: Vec<PathBuf> = self
            .databases
            .iter()
            .filter(|(_, db)| db.source.contains(&path))
            .map(|(main, _)| main.clone())
            .collect();
        if affected.is_empty() {
            // late event for a file nothing references any more
            if self.watches.is_watched(&path) {
                tracing::debug!("dropping stale watch on {}", path.display());
                self.watches.unwatch_all(&path);
            }
            return;
        }
        let mtime = match std::fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(mtime) => mtime,
            Err(err) => {
                tracing::warn!("stat failed for {}: {}", path.display(), err);
                self.watches.unwatch(&path);
                return;
            }
        };
        for main in affected {
            let stale = self
                .databases
                .get(&main)
                .map(|db| mtime > db.index_time())
                .unwrap_or(false);
            if stale {
                tracing::info!("{} changed, re-indexing {}", path.display(), main.display());
                self.index_file(main, None).await;
            }
        }
    }

    fn unindex(&mut self, msg: &ClientMessage, reply: &Responder) {
        let Some(file) = &msg.file else {
            reply.send_error(ErrorCode::MissingFile);
            return;
        };
        match self.databases.remove(file) {
            None => reply.send_error(ErrorCode::FileNotIndexed),
            Some(db) => {
                for path in db.source.all_files() {
                    self.watches.unwatch(&path);
                }
                if let Err(err) = self.manifest.remove(file) {
                    tracing::warn!("manifest update failed: {}", err);
                }
                tracing::info!("unindexed {}", file.display());
                reply.send(Map::new());
            }
        }
    }

    /// Look up the database and symbol under a request's cursor location.
    fn cursor_symbol(&self, msg: &ClientMessage) -> Result<(&Database, usize), ErrorCode> {
        let Some((file, offset)) = msg.location.as_ref().and_then(|loc| loc.validate()) else {
            return Err(ErrorCode::InvalidLocation);
        };
        let db = self.databases.get(file).ok_or(ErrorCode::FileNotIndexed)?;
        let (pos, _) = db.find_symbol(offset).ok_or(ErrorCode::SymbolNotFound)?;
        Ok((db, pos))
    }

    fn follow_symbol(&self, msg: &ClientMessage, reply: &Responder) {
        match self.cursor_symbol(msg) {
            Err(code) => reply.send_error(code),
            Ok((db, pos)) => {
                let mut payload = Map::new();
                if let Some(target) = &db.symbols[pos].target {
                    payload.insert(
                        "target".into(),
                        json!(WireLocation {
                            file: target.file.clone(),
                            offset: target.start,
                        }),
                    );
                }
                reply.send(payload);
            }
        }
    }

    fn find_references(&self, msg: &ClientMessage, reply: &Responder) {
        let (db, pos) = match self.cursor_symbol(msg) {
            Err(code) => {
                reply.send_error(code);
                return;
            }
            Ok(found) => found,
        };
        let symbol = &db.symbols[pos];
        let cursor_start = symbol.location.start;
        // a reference's list lives on its definition
        let resolved = if symbol.definition {
            symbol
        } else {
            symbol
                .target
                .as_ref()
                .and_then(|target| db.find_symbol(target.start))
                .map(|(_, definition)| definition)
                .unwrap_or(symbol)
        };
        let mut references: Vec<&Location> = resolved.references.iter().collect();
        references.sort_by(|a, b| Location::compare(a, b));
        // rotate so the occurrence under the cursor comes out last and the
        // client's "next reference" is the one just past it
        let len = references.len();
        for idx in 0..len.saturating_sub(1) {
            if references[idx].start == cursor_start {
                references.rotate_left(idx + 1);
                break;
            }
        }
        let list: Vec<WireLocation> = references
            .iter()
            .map(|loc| WireLocation {
                file: loc.file.clone(),
                offset: loc.start,
            })
            .collect();
        let mut payload = Map::new();
        payload.insert("references".into(), json!(list));
        reply.send(payload);
    }

    fn cursor_info(&self, msg: &ClientMessage, reply: &Responder) {
        match self.cursor_symbol(msg) {
            Err(code) => reply.send_error(code),
            Ok((db, pos)) => {
                let mut payload = Map::new();
                payload.insert("cursorInfo".into(), json!(&db.symbols[pos]));
                reply.send(payload);
            }
        }
    }

    fn find_symbol(&self, msg: &ClientMessage, reply: &Responder) {
        let Some(name) = &msg.symbol_name else {
            reply.send_error(ErrorCode::MissingSymbolName);
            return;
        };
        let mut locations: Vec<WireLocation> = Vec::new();
        if let Some(file) = &msg.file {
            let Some(db) = self.databases.get(file) else {
                reply.send_error(ErrorCode::FileNotIndexed);
                return;
            };
            collect_name_hits(db, name, &mut locations);
        } else {
            for db in self.databases.values() {
                collect_name_hits(db, name, &mut locations);
            }
        }
        if locations.is_empty() {
            reply.send_error(ErrorCode::SymbolNotFound);
            return;
        }
        locations.sort();
        locations.dedup();
        let mut payload = Map::new();
        payload.insert("locations".into(), json!(locations));
        reply.send(payload);
    }

    fn list_symbols(&self, msg: &ClientMessage, reply: &Responder) {
        let prefix = msg.prefix.as_deref();
        let names: Vec<String> = if let Some(file) = &msg.file {
            let Some(db) = self.databases.get(file) else {
                reply.send_error(ErrorCode::FileNotIndexed);
                return;
            };
            db.list_symbol_names(prefix)
        } else {
            let mut set: HashSet<String> = HashSet::new();
            for db in self.databases.values() {
                set.extend(db.list_symbol_names(prefix));
            }
            let mut names: Vec<String> = set.into_iter().collect();
            names.sort();
            names
        };
        let mut payload = Map::new();
        payload.insert("symbolNames".into(), json!(names));
        reply.send(payload);
    }

    fn dump(&self, msg: &ClientMessage, reply: &Responder) {
        if let Some(file) = &msg.file {
            let Some(db) = self.databases.get(file) else {
                reply.send_error(ErrorCode::FileNotIndexed);
                return;
            };
            let text = match serde_json::to_string_pretty(db) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!("dump serialization failed: {}", err);
                    String::new()
                }
            };
            let mut payload = Map::new();
            payload.insert("dump".into(), Value::String(text));
            reply.send(payload);
            return;
        }
        // one summary line per indexed file, then an empty terminator
        let mut mains: Vec<&PathBuf> = self.databases.keys().collect();
        mains.sort();
        for main in mains {
            let millis = unix_millis(self.databases[main].index_time());
            let mut payload = Map::new();
            payload.insert(
                "dump".into(),
                Value::String(format!("{} {}", main.display(), millis)),
            );
            reply.send_chunk(payload);
        }
        reply.send(Map::new());
    }
}

fn collect_name_hits(db: &Database, name: &str, out: &mut Vec<WireLocation>) {
    if let Some(locations) = db.find_symbols_by_name(name) {
        out.extend(locations.into_iter().map(|loc| WireLocation {
            file: loc.file,
            offset: loc.start,
        }));
    }
}

fn wire_error(err: &JscopeError) -> ErrorCode {
    match err {
        JscopeError::Parsing(_) | JscopeError::Internal(_) => ErrorCode::ParseFailure,
        JscopeError::Stat { .. } => ErrorCode::StatFailure,
        _ => ErrorCode::ReadFailure,
    }
}

fn unix_millis(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn test_daemon(dir: &Path) -> Daemon {
        let (manifest, _) = Manifest::open(&dir.join("data"), false).unwrap();
        let (daemon, _handle) = Daemon::new(manifest).unwrap();
        daemon
    }

    async fn send(daemon: &mut Daemon, tx: &mpsc::UnboundedSender<String>, text: &str) {
        let msg = ClientMessage::parse(text).unwrap();
        let reply = Responder::new(msg.kind.clone(), tx.clone());
        daemon.handle_request(msg, reply).await;
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = rx.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    fn index_request(file: &Path) -> String {
        format!(r#"{{"type":"index","file":"{}"}}"#, file.display())
    }

    #[tokio::test]
    async fn index_acks_then_rejects_an_unchanged_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("app.js");
        fs::write(&file, "var value = 1;\nvalue;\n").unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(&mut daemon, &tx, &index_request(&file)).await;
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["error"], "ok");
        assert_eq!(frames[0]["type"], "index");

        send(&mut daemon, &tx, &index_request(&file)).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["error"], "file already indexed");
    }

    #[tokio::test]
    async fn malformed_requests_get_precise_errors() {
        let dir = TempDir::new().unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(&mut daemon, &tx, r#"{"type":"index"}"#).await;
        send(&mut daemon, &tx, r#"{"type":"find-symbol"}"#).await;
        send(&mut daemon, &tx, r#"{"type":"follow-symbol"}"#).await;
        send(
            &mut daemon,
            &tx,
            r#"{"type":"follow-symbol","location":{"file":"/nowhere.js"}}"#,
        )
        .await;
        send(
            &mut daemon,
            &tx,
            r#"{"type":"cursor-info","location":{"file":"/nowhere.js","offset":0}}"#,
        )
        .await;
        send(&mut daemon, &tx, r#"{"type":"explode"}"#).await;

        let frames = drain(&mut rx);
        let errors: Vec<&str> = frames
            .iter()
            .map(|f| f["error"].as_str().unwrap())
            .collect();
        assert_eq!(
            errors,
            vec![
                "missing file",
                "missing symbolname",
                "invalid location",
                "invalid location",
                "file not indexed",
                "unknown command",
            ]
        );
        assert_eq!(frames[5]["type"], "explode");
    }

    #[tokio::test]
    async fn references_rotate_past_the_cursor() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("refs.js");
        let code = "var q = 1;\nq;\nq;\nq;\n";
        fs::write(&file, code).unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(&mut daemon, &tx, &index_request(&file)).await;
        drain(&mut rx);

        let ask = |offset: usize| {
            format!(
                r#"{{"type":"find-references","location":{{"file":"{}","offset":{}}}}}"#,
                file.display(),
                offset
            )
        };

        // from the middle occurrence the list resumes just past the cursor
        send(&mut daemon, &tx, &ask(14)).await;
        let frames = drain(&mut rx);
        let offsets: Vec<u64> = frames[0]["references"]
            .as_array()
            .unwrap()
            .iter()
            .map(|loc| loc["offset"].as_u64().unwrap())
            .collect();
        assert_eq!(offsets, vec![17, 11, 14]);

        // from the definition the list keeps plain location order
        send(&mut daemon, &tx, &ask(4)).await;
        let frames = drain(&mut rx);
        let offsets: Vec<u64> = frames[0]["references"]
            .as_array()
            .unwrap()
            .iter()
            .map(|loc| loc["offset"].as_u64().unwrap())
            .collect();
        assert_eq!(offsets, vec![11, 14, 17]);
    }

    #[tokio::test]
    async fn follow_symbol_lands_on_the_definition() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("follow.js");
        fs::write(&file, "function go() {}\ngo();\n").unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(&mut daemon, &tx, &index_request(&file)).await;
        drain(&mut rx);

        let request = format!(
            r#"{{"type":"follow-symbol","location":{{"file":"{}","offset":17}}}}"#,
            file.display()
        );
        send(&mut daemon, &tx, &request).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["error"], "ok");
        assert_eq!(frames[0]["target"]["offset"], 9);

        // the definition itself has nowhere to go
        let request = format!(
            r#"{{"type":"follow-symbol","location":{{"file":"{}","offset":9}}}}"#,
            file.display()
        );
        send(&mut daemon, &tx, &request).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["error"], "ok");
        assert!(frames[0].get("target").is_none());
    }

    #[tokio::test]
    async fn unindex_forgets_the_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("gone.js");
        fs::write(&file, "var gone = 1;\n").unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(&mut daemon, &tx, &index_request(&file)).await;
        drain(&mut rx);

        let request = format!(r#"{{"type":"unindex","file":"{}"}}"#, file.display());
        send(&mut daemon, &tx, &request).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["error"], "ok");

        send(&mut daemon, &tx, &request).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["error"], "file not indexed");

        let request = format!(
            r#"{{"type":"cursor-info","location":{{"file":"{}","offset":4}}}}"#,
            file.display()
        );
        send(&mut daemon, &tx, &request).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["error"], "file not indexed");
    }

    #[tokio::test]
    async fn find_symbol_unions_files_sorted_and_deduped() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.js");
        let second = dir.path().join("b.js");
        fs::write(&first, "var shape = 1;\n").unwrap();
        fs::write(&second, "var shape = 2;\n").unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(&mut daemon, &tx, &index_request(&first)).await;
        send(&mut daemon, &tx, &index_request(&second)).await;
        drain(&mut rx);

        send(&mut daemon, &tx, r#"{"type":"find-symbol","symbolName":"shape"}"#).await;
        let frames = drain(&mut rx);
        let locations = frames[0]["locations"].as_array().unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0]["file"], first.display().to_string());
        assert_eq!(locations[1]["file"], second.display().to_string());
        assert_eq!(locations[0]["offset"], 4);

        send(&mut daemon, &tx, r#"{"type":"find-symbol","symbolName":"nothing"}"#).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["error"], "symbol not found");
    }

    #[tokio::test]
    async fn list_symbols_unions_and_filters() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.js");
        let second = dir.path().join("b.js");
        fs::write(&first, "var alpha = 1;\nvar omega = 2;\n").unwrap();
        fs::write(&second, "var alpha = 3;\nvar beta = 4;\n").unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(&mut daemon, &tx, &index_request(&first)).await;
        send(&mut daemon, &tx, &index_request(&second)).await;
        drain(&mut rx);

        send(&mut daemon, &tx, r#"{"type":"list-symbols"}"#).await;
        let frames = drain(&mut rx);
        let names: Vec<&str> = frames[0]["symbolNames"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n.as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "omega"]);

        let request = format!(
            r#"{{"type":"list-symbols","prefix":"a","file":"{}"}}"#,
            second.display()
        );
        send(&mut daemon, &tx, &request).await;
        let frames = drain(&mut rx);
        let names: Vec<&str> = frames[0]["symbolNames"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n.as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alpha"]);
    }

    #[tokio::test]
    async fn changed_files_are_reindexed_on_watch_events() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("live.js");
        fs::write(&file, "var first = 1;\n").unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(&mut daemon, &tx, &index_request(&file)).await;
        drain(&mut rx);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        fs::write(&file, "var second = 2;\n").unwrap();
        daemon.handle_file_changed(file.clone()).await;

        send(&mut daemon, &tx, r#"{"type":"list-symbols"}"#).await;
        let frames = drain(&mut rx);
        let names = frames[0]["symbolNames"].as_array().unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0], "second");
    }

    #[tokio::test]
    async fn reindexing_a_deleted_file_reports_stat_failure() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("doomed.js");
        fs::write(&file, "var doomed = 1;\n").unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(&mut daemon, &tx, &index_request(&file)).await;
        drain(&mut rx);

        fs::remove_file(&file).unwrap();
        send(&mut daemon, &tx, &index_request(&file)).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["error"], "stat failure");
    }

    #[tokio::test]
    async fn indexing_a_missing_file_reports_read_failure() {
        let dir = TempDir::new().unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(
            &mut daemon,
            &tx,
            &index_request(&dir.path().join("absent.js")),
        )
        .await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["error"], "read failure");
    }

    #[tokio::test]
    async fn dump_all_streams_chunks_then_terminates() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.js");
        let second = dir.path().join("b.js");
        fs::write(&first, "var a = 1;\n").unwrap();
        fs::write(&second, "var b = 2;\n").unwrap();
        let mut daemon = test_daemon(dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        send(&mut daemon, &tx, &index_request(&first)).await;
        send(&mut daemon, &tx, &index_request(&second)).await;
        drain(&mut rx);

        send(&mut daemon, &tx, r#"{"type":"dump"}"#).await;
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["error"], "more data");
        assert!(frames[0]["dump"]
            .as_str()
            .unwrap()
            .starts_with(&first.display().to_string()));
        assert_eq!(frames[1]["error"], "more data");
        assert_eq!(frames[2]["error"], "ok");
        assert!(frames[2].get("dump").is_none());

        let request = format!(r#"{{"type":"dump","file":"{}"}}"#, first.display());
        send(&mut daemon, &tx, &request).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["error"], "ok");
        let dumped: Value =
            serde_json::from_str(frames[0]["dump"].as_str().unwrap()).unwrap();
        assert_eq!(dumped["source"]["mainFile"], first.display().to_string());
    }

    #[tokio::test]
    async fn replay_restores_previous_indexes() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("kept.js");
        fs::write(&file, "var kept = 1;\n").unwrap();

        {
            let mut daemon = test_daemon(dir.path());
            let (tx, mut rx) = mpsc::unbounded_channel();
            send(&mut daemon, &tx, &index_request(&file)).await;
            drain(&mut rx);
        }

        let (manifest, replay) = Manifest::open(&dir.path().join("data"), false).unwrap();
        assert_eq!(replay, vec![file.clone()]);
        let (mut daemon, _handle) = Daemon::new(manifest).unwrap();
        daemon.replay(replay).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        send(&mut daemon, &tx, r#"{"type":"list-symbols"}"#).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["symbolNames"][0], "kept");
    }
}
