#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! AST-level test to forbid unbounded channels.
//!
//! Every queue between the serial link, the gesture loop and the feedback
//! multiplexer is bounded. A panel that stops reading must slow the host
//! down, not grow a backlog of LED commands that replays seconds later.
//!
//! Example of bad code:
//! ```ignore
//! // BAD: a stalled link lets this grow without limit
//! let (tx, rx) = mpsc::unbounded_channel();
//! ```
//!
//! Example of correct code:
//! ```ignore
//! // GOOD: senders wait once the queue is full
//! let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
//! ```

use std::fs;
use std::path::Path;
use syn::visit::Visit;
use syn::{Expr, ExprCall, File};
use walkdir::WalkDir;

/// Visitor that detects `unbounded_channel()` calls
struct UnboundedChannelVisitor {
    current_file: String,
    violations: Vec<(String, String)>,
}

impl UnboundedChannelVisitor {
    fn new(file: String) -> Self {
        Self {
            current_file: file,
            violations: Vec::new(),
        }
    }
}

impl<'ast> Visit<'ast> for UnboundedChannelVisitor {
    fn visit_expr_call(&mut self, call: &'ast ExprCall) {
        if let Expr::Path(path) = &*call.func {
            if let Some(last) = path.path.segments.last() {
                if last.ident == "unbounded_channel" {
                    let full = path
                        .path
                        .segments
                        .iter()
                        .map(|s| s.ident.to_string())
                        .collect::<Vec<_>>()
                        .join("::");
                    self.violations.push((
                        self.current_file.clone(),
                        format!("{}() - use a bounded channel", full),
                    ));
                }
            }
        }

        syn::visit::visit_expr_call(self, call);
    }
}

fn analyze_file(path: &Path) -> Vec<(String, String)> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return vec![],
    };

    let syntax: File = match syn::parse_file(&content) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
            return vec![];
        }
    };

    let mut visitor = UnboundedChannelVisitor::new(path.display().to_string());
    visitor.visit_file(&syntax);
    visitor.violations
}

#[test]
fn detects_unbounded_channel() {
    let bad_code = r#"
        fn example() {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
        }
    "#;

    let syntax: File = syn::parse_file(bad_code).unwrap();
    let mut visitor = UnboundedChannelVisitor::new("test.rs".to_string());
    visitor.visit_file(&syntax);

    assert_eq!(visitor.violations.len(), 1);
    assert!(visitor.violations[0].1.contains("mpsc::unbounded_channel"));
}

#[test]
fn allows_bounded_channel() {
    let good_code = r#"
        fn example() {
            let (tx, rx) = mpsc::channel::<u8>(16);
            let (ack_tx, ack_rx) = oneshot::channel::<()>();
        }
    "#;

    let syntax: File = syn::parse_file(good_code).unwrap();
    let mut visitor = UnboundedChannelVisitor::new("test.rs".to_string());
    visitor.visit_file(&syntax);

    assert!(visitor.violations.is_empty());
}

#[test]
fn no_unbounded_channel_violations() {
    let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");

    let mut all_violations = Vec::new();

    for entry in WalkDir::new(&src_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "rs"))
    {
        let violations = analyze_file(entry.path());
        all_violations.extend(violations);
    }

    if !all_violations.is_empty() {
        let mut error_msg = String::from(
            "\n\nFound unbounded channels!\n\
             Queues between the link, the gesture loop and the LEDs must be bounded.\n\n\
             Violations:\n",
        );

        for (file, context) in &all_violations {
            error_msg.push_str(&format!("  - {}: {}\n", file, context));
        }

        panic!("{}", error_msg);
    }
}
