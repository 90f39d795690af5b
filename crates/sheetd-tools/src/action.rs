//! The closed set of tool actions.
//!
//! Every action a tool caller can invoke is a variant here, so adding or
//! removing one is a compile-time-checked change: `parse` admits it,
//! `command` routes it, and nothing dispatches on bare strings.

use std::time::Duration;

use serde_json::{json, Value};

use sheetd_core::Error;

use crate::ToolError;

/// A validated tool invocation, ready to forward.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    BatchBegin {
        path: String,
    },
    BatchCommit {
        session: String,
        save: bool,
        timeout_ms: Option<u64>,
    },
    BatchList,
    WorkbookInfo {
        session: String,
    },
    WorksheetAdd {
        session: String,
        name: String,
    },
    WorksheetDelete {
        session: String,
        name: String,
    },
    WorksheetRename {
        session: String,
        name: String,
        new_name: String,
    },
    WorksheetList {
        session: String,
    },
    RangeGetValues {
        session: String,
        sheet: String,
        range: String,
    },
    RangeSetValues {
        session: String,
        sheet: String,
        range: String,
        values: Value,
    },
    RangeClear {
        session: String,
        sheet: String,
        range: String,
    },
    TableAdd {
        session: String,
        sheet: String,
        range: String,
        name: Option<String>,
        has_headers: bool,
    },
    TableSort {
        session: String,
        name: String,
        column: String,
        descending: bool,
    },
    ChartAdd {
        session: String,
        sheet: String,
        source_range: String,
        chart_type: String,
    },
    PivotFieldAddRow {
        session: String,
        pivot_table: String,
        field: String,
    },
    CalculationSetMode {
        session: String,
        mode: String,
    },
    CalculationRecalculate {
        session: String,
    },
    WorkerPing,
    WorkerShutdown,
}

impl ToolAction {
    /// Validate `params` for `action`. Fails fast with a structured
    /// missing-parameter error naming both, before any transport call.
    pub fn parse(action: &str, params: &Value) -> Result<Self, ToolError> {
        let p = Params { action, params };
        let parsed = match action {
            "batch.begin" => ToolAction::BatchBegin {
                path: p.required("path")?,
            },
            "batch.commit" => ToolAction::BatchCommit {
                session: p.required("session")?,
                save: p.bool_or("save", true),
                timeout_ms: p.u64_opt("timeout_ms"),
            },
            "batch.list" => ToolAction::BatchList,
            "workbook.info" => ToolAction::WorkbookInfo {
                session: p.required("session")?,
            },
            "worksheet.add" => ToolAction::WorksheetAdd {
                session: p.required("session")?,
                name: p.required("name")?,
            },
            "worksheet.delete" => ToolAction::WorksheetDelete {
                session: p.required("session")?,
                name: p.required("name")?,
            },
            "worksheet.rename" => ToolAction::WorksheetRename {
                session: p.required("session")?,
                name: p.required("name")?,
                new_name: p.required("new_name")?,
            },
            "worksheet.list" => ToolAction::WorksheetList {
                session: p.required("session")?,
            },
            "range.get-values" => ToolAction::RangeGetValues {
                session: p.required("session")?,
                sheet: p.required("sheet")?,
                range: p.required("range")?,
            },
            "range.set-values" => ToolAction::RangeSetValues {
                session: p.required("session")?,
                sheet: p.required("sheet")?,
                range: p.required("range")?,
                values: p.required_value("values")?,
            },
            "range.clear" => ToolAction::RangeClear {
                session: p.required("session")?,
                sheet: p.required("sheet")?,
                range: p.required("range")?,
            },
            "table.add" => ToolAction::TableAdd {
                session: p.required("session")?,
                sheet: p.required("sheet")?,
                range: p.required("range")?,
                name: p.str_opt("name"),
                has_headers: p.bool_or("has_headers", true),
            },
            "table.sort" => ToolAction::TableSort {
                session: p.required("session")?,
                name: p.required("name")?,
                column: p.required("column")?,
                descending: p.bool_or("descending", false),
            },
            "chart.add" => ToolAction::ChartAdd {
                session: p.required("session")?,
                sheet: p.required("sheet")?,
                source_range: p.required("source_range")?,
                chart_type: p.required("chart_type")?,
            },
            "pivottablefield.add-row-field" => ToolAction::PivotFieldAddRow {
                session: p.required("session")?,
                pivot_table: p.required("pivot_table")?,
                field: p.required("field")?,
            },
            "calculation.set-mode" => ToolAction::CalculationSetMode {
                session: p.required("session")?,
                mode: p.required("mode")?,
            },
            "calculation.recalculate" => ToolAction::CalculationRecalculate {
                session: p.required("session")?,
            },
            "worker.ping" => ToolAction::WorkerPing,
            "worker.shutdown" => ToolAction::WorkerShutdown,
            other => {
                return Err(ToolError::UnknownAction {
                    action: other.to_string(),
                })
            }
        };
        Ok(parsed)
    }

    /// The wire command this action forwards as.
    pub fn command(&self) -> &'static str {
        match self {
            ToolAction::BatchBegin { .. } => "batch.begin",
            ToolAction::BatchCommit { .. } => "batch.commit",
            ToolAction::BatchList => "batch.list",
            ToolAction::WorkbookInfo { .. } => "workbook.info",
            ToolAction::WorksheetAdd { .. } => "worksheet.add",
            ToolAction::WorksheetDelete { .. } => "worksheet.delete",
            ToolAction::WorksheetRename { .. } => "worksheet.rename",
            ToolAction::WorksheetList { .. } => "worksheet.list",
            ToolAction::RangeGetValues { .. } => "range.get-values",
            ToolAction::RangeSetValues { .. } => "range.set-values",
            ToolAction::RangeClear { .. } => "range.clear",
            ToolAction::TableAdd { .. } => "table.add",
            ToolAction::TableSort { .. } => "table.sort",
            ToolAction::ChartAdd { .. } => "chart.add",
            ToolAction::PivotFieldAddRow { .. } => "pivottablefield.add-row-field",
            ToolAction::CalculationSetMode { .. } => "calculation.set-mode",
            ToolAction::CalculationRecalculate { .. } => "calculation.recalculate",
            ToolAction::WorkerPing => "worker.ping",
            ToolAction::WorkerShutdown => "worker.shutdown",
        }
    }

    /// The session id this action addresses, if any.
    pub fn session(&self) -> Option<&str> {
        match self {
            ToolAction::BatchBegin { .. } | ToolAction::BatchList => None,
            ToolAction::WorkerPing | ToolAction::WorkerShutdown => None,
            ToolAction::BatchCommit { session, .. }
            | ToolAction::WorkbookInfo { session }
            | ToolAction::WorksheetAdd { session, .. }
            | ToolAction::WorksheetDelete { session, .. }
            | ToolAction::WorksheetRename { session, .. }
            | ToolAction::WorksheetList { session }
            | ToolAction::RangeGetValues { session, .. }
            | ToolAction::RangeSetValues { session, .. }
            | ToolAction::RangeClear { session, .. }
            | ToolAction::TableAdd { session, .. }
            | ToolAction::TableSort { session, .. }
            | ToolAction::ChartAdd { session, .. }
            | ToolAction::PivotFieldAddRow { session, .. }
            | ToolAction::CalculationSetMode { session, .. }
            | ToolAction::CalculationRecalculate { session } => Some(session),
        }
    }

    /// The wire arguments for this action.
    pub fn args(&self) -> Value {
        match self {
            ToolAction::BatchBegin { path } => json!({ "path": path }),
            ToolAction::BatchCommit { save, .. } => json!({ "save": save }),
            ToolAction::BatchList
            | ToolAction::WorkbookInfo { .. }
            | ToolAction::WorksheetList { .. }
            | ToolAction::CalculationRecalculate { .. }
            | ToolAction::WorkerPing
            | ToolAction::WorkerShutdown => Value::Null,
            ToolAction::WorksheetAdd { name, .. } | ToolAction::WorksheetDelete { name, .. } => {
                json!({ "name": name })
            }
            ToolAction::WorksheetRename { name, new_name, .. } => {
                json!({ "name": name, "new_name": new_name })
            }
            ToolAction::RangeGetValues { sheet, range, .. }
            | ToolAction::RangeClear { sheet, range, .. } => {
                json!({ "sheet": sheet, "range": range })
            }
            ToolAction::RangeSetValues {
                sheet,
                range,
                values,
                ..
            } => json!({ "sheet": sheet, "range": range, "values": values }),
            ToolAction::TableAdd {
                sheet,
                range,
                name,
                has_headers,
                ..
            } => json!({
                "sheet": sheet,
                "range": range,
                "name": name,
                "has_headers": has_headers,
            }),
            ToolAction::TableSort {
                name,
                column,
                descending,
                ..
            } => json!({ "name": name, "column": column, "descending": descending }),
            ToolAction::ChartAdd {
                sheet,
                source_range,
                chart_type,
                ..
            } => json!({
                "sheet": sheet,
                "source_range": source_range,
                "chart_type": chart_type,
            }),
            ToolAction::PivotFieldAddRow {
                pivot_table, field, ..
            } => json!({ "pivot_table": pivot_table, "field": field }),
            ToolAction::CalculationSetMode { mode, .. } => json!({ "mode": mode }),
        }
    }

    /// Per-call timeout override, where the action carries one.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            ToolAction::BatchCommit { timeout_ms, .. } => {
                timeout_ms.map(Duration::from_millis)
            }
            _ => None,
        }
    }
}

struct Params<'a> {
    action: &'a str,
    params: &'a Value,
}

impl Params<'_> {
    fn required(&self, key: &str) -> Result<String, ToolError> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ToolError::Core(Error::missing_parameter(self.action, key)))
    }

    fn required_value(&self, key: &str) -> Result<Value, ToolError> {
        match self.params.get(key) {
            Some(v) if !v.is_null() => Ok(v.clone()),
            _ => Err(ToolError::Core(Error::missing_parameter(self.action, key))),
        }
    }

    fn str_opt(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.params
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    fn u64_opt(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }
}
