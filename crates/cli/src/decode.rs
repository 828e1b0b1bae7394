//! `timeline decode` -- dry-run a push envelope without writing it.

use std::path::Path;
use std::process;

use timeline_core::{ActivityDelivery, TimelineWriter};

use crate::{report_error, OutputFormat};

pub(crate) fn cmd_decode(file: &Path, output: OutputFormat) {
    let body = match std::fs::read(file) {
        Ok(b) => b,
        Err(e) => {
            report_error(
                &format!("error reading file '{}': {}", file.display(), e),
                output,
            );
            process::exit(1);
        }
    };

    match TimelineWriter::decode(&body) {
        Ok(delivery) => println!("{}", render(&delivery, output)),
        Err(e) => {
            report_error(&format!("{} ({})", e, e.code()), output);
            process::exit(1);
        }
    }
}

fn render(delivery: &ActivityDelivery, output: OutputFormat) -> String {
    let record = serde_json::Value::Object(delivery.record.clone());
    match output {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "path": delivery.path.to_string(),
                "uid": delivery.uid,
                "activity_id": delivery.activity_id,
                "message_id": delivery.message_id,
                "subscription": delivery.subscription,
                "record": record,
            });
            serde_json::to_string_pretty(&value)
                .unwrap_or_else(|e| format!("serialization error: {}", e))
        }
        OutputFormat::Text => {
            let mut out = format!("path:       {}\n", delivery.path);
            if let Some(id) = &delivery.message_id {
                out.push_str(&format!("message id: {}\n", id));
            }
            let pretty = serde_json::to_string_pretty(&record)
                .unwrap_or_else(|e| format!("serialization error: {}", e));
            out.push_str(&pretty);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    use super::*;

    fn sample() -> ActivityDelivery {
        let body = serde_json::json!({
            "message": {
                "data": BASE64.encode(r#"{"ID":"a1","text":"hi"}"#),
                "attributes": {"uid": "u42"},
                "messageId": "77"
            }
        })
        .to_string();
        TimelineWriter::decode(body.as_bytes()).unwrap()
    }

    #[test]
    fn text_output_shows_path_and_record() {
        let text = render(&sample(), OutputFormat::Text);
        assert!(text.starts_with("path:       users/u42/timeline/a1\n"));
        assert!(text.contains("message id: 77"));
        assert!(text.contains("\"text\": \"hi\""));
        assert!(!text.contains("\"ID\""));
    }

    #[test]
    fn json_output_is_parseable() {
        let json: serde_json::Value =
            serde_json::from_str(&render(&sample(), OutputFormat::Json)).unwrap();
        assert_eq!(json["path"], "users/u42/timeline/a1");
        assert_eq!(json["activity_id"], "a1");
        assert_eq!(json["record"], serde_json::json!({"text": "hi"}));
    }
}
