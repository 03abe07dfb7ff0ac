//! The "Client info" sheet and the `add_contact_info` tool that fills it.

use std::sync::Arc;

use async_trait::async_trait;
use relay_agent::{ToolArguments, ToolError, ToolHandler};
use serde_json::Value;
use tracing::info;

use super::SheetBackend;

pub const TOOL_NAME: &str = "add_contact_info";

/// Reply sent to the customer once their details are stored ("saved successfully").
pub const SAVED_REPLY: &str = "บันทึกข้อมูลสำเร็จ";

/// Column order of the contact sheet.
const FIELDS: [&str; 5] = ["name", "email", "phone", "address", "additional_requirements"];

pub struct ContactSheet {
    backend: Arc<dyn SheetBackend>,
    sheet: String,
}

impl ContactSheet {
    pub fn new(backend: Arc<dyn SheetBackend>, sheet: impl Into<String>) -> Self {
        Self {
            backend,
            sheet: sheet.into(),
        }
    }
}

/// Missing fields become empty cells; non-string values are written as JSON.
fn contact_row(arguments: &ToolArguments) -> Vec<String> {
    FIELDS
        .iter()
        .map(|field| match arguments.get(*field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        })
        .collect()
}

#[async_trait]
impl ToolHandler for ContactSheet {
    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        let row = contact_row(&arguments);
        self.backend
            .append_row(&self.sheet, row)
            .await
            .map_err(|e| ToolError::Execution {
                name: TOOL_NAME.to_owned(),
                message: e.to_string(),
            })?;
        info!(sheet = %self.sheet, "saved contact details");
        Ok(SAVED_REPLY.to_owned())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::MemorySheet;
    use serde_json::json;

    fn args(value: Value) -> ToolArguments {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn appends_row_in_column_order_and_confirms() {
        let sheet = Arc::new(MemorySheet::new());
        let tool = ContactSheet::new(sheet.clone(), "Client info");

        let reply = tool
            .call(args(json!({
                "name": "Sam Doe",
                "phone": "1234567890",
                "email": "sam@example.com",
            })))
            .await
            .unwrap();

        assert_eq!(reply, SAVED_REPLY);
        assert_eq!(
            sheet.row("Client info", 1),
            vec!["Sam Doe", "sam@example.com", "1234567890", "", ""]
        );
    }

    #[test]
    fn non_string_values_are_stringified() {
        let row = contact_row(&args(json!({"phone": 5551234, "address": null})));
        assert_eq!(row, vec!["", "", "5551234", "", ""]);
    }

    #[tokio::test]
    async fn sheet_failures_become_tool_errors() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.fail_writes(true);
        let tool = ContactSheet::new(sheet, "Client info");
        let err = tool.call(ToolArguments::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution { ref name, .. } if name == TOOL_NAME));
    }
}
