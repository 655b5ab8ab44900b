//! Live backend that drives a running Excel instance through generated
//! PowerShell scripts.
//!
//! Every call writes one script to a temporary `.ps1` file, runs it, and
//! parses stdout. Scripts end by printing `SUCCESS: ...` or `ERROR: ...`;
//! reads additionally use a small line protocol:
//!
//! ```text
//! SHEET_INFO:<sheet that was read>
//! SHEET_LIST:<name>|CELL_DELIM|<name>...
//! DATA_START
//! <cell>|CELL_DELIM|<cell>...
//! DATA_END
//! ```
//!
//! or `EMPTY_SHEET` in place of the data block. Newlines inside a cell are
//! sent as `|NL|`.
//!
//! Listing open workbooks prints one block per workbook and a terminator:
//!
//! ```text
//! WORKBOOK:<full path>
//! NAME:<name>
//! SAVED:True|False
//! ACTIVE_SHEET:<name>
//! SHEET_LIST:<name>|CELL_DELIM|<name>...
//! WORKBOOK_END
//! LIST_END
//! ```
//!
//! or a lone `NO_APPLICATION` when the process is not running.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use cellsync_common::{CellCoord, CellValue, Dataset, OpKind, Patch, Row};
use serde::{Deserialize, Serialize};

use crate::error::IoError;
use crate::live::{BackendReply, CloseOptions, LiveBackend, LiveDocument, OpenDocument, SheetChange};
use crate::target::{DocumentRef, SheetSelector, SheetTarget};
use crate::traits::SheetSnapshot;

const CELL_DELIM: &str = "|CELL_DELIM|";
const NEWLINE_TOKEN: &str = "|NL|";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerShellConfig {
    /// `powershell` (Windows PowerShell) or `pwsh`.
    pub executable: String,
    /// Process name checked by the readiness probe.
    pub process_name: String,
    /// COM ProgID of the running application.
    pub prog_id: String,
}

impl Default for PowerShellConfig {
    fn default() -> Self {
        Self {
            executable: "powershell".to_string(),
            process_name: "EXCEL".to_string(),
            prog_id: "Excel.Application".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PowerShellLive {
    config: PowerShellConfig,
}

impl PowerShellLive {
    pub fn new(config: PowerShellConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PowerShellConfig {
        &self.config
    }

    fn run_script(&self, body: &str) -> Result<String, IoError> {
        let mut file = tempfile::Builder::new()
            .prefix("cellsync_")
            .suffix(".ps1")
            .tempfile()?;
        // Windows PowerShell reads BOM-less scripts in the ANSI code page.
        file.write_all("\u{feff}".as_bytes())?;
        file.write_all(body.as_bytes())?;
        file.flush()?;

        let output = Command::new(&self.config.executable)
            .args([
                "-ExecutionPolicy",
                "Bypass",
                "-NoLogo",
                "-NonInteractive",
                "-File",
            ])
            .arg(file.path())
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    IoError::Unavailable(format!("'{}' not found", self.config.executable))
                }
                _ => IoError::Script(e.to_string()),
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::trace!(status = ?output.status, bytes = stdout.len(), "script finished");
        Ok(stdout)
    }

    fn run_for_reply(&self, body: &str) -> Result<BackendReply, IoError> {
        self.run_script(body).map(|out| parse_reply(&out))
    }
}

impl LiveBackend for PowerShellLive {
    fn backend_name(&self) -> &'static str {
        "powershell"
    }

    fn is_responsive(&self) -> bool {
        match self.run_for_reply(&script::responsive(&self.config)) {
            Ok(reply) => reply.is_acknowledged(),
            Err(err) => {
                tracing::debug!(error = %err, "readiness check failed");
                false
            }
        }
    }

    fn attach(&self, doc: &DocumentRef) -> Result<LiveDocument, IoError> {
        match self.run_for_reply(&script::attach(&self.config, doc.path()))? {
            BackendReply::Acknowledged(workbook) => Ok(LiveDocument {
                path: doc.path().to_path_buf(),
                workbook,
            }),
            other => Err(IoError::Script(other.message().to_string())),
        }
    }

    fn sheet_names(&self, doc: &LiveDocument) -> Result<Vec<String>, IoError> {
        let out = self.run_script(&script::sheet_list(&self.config, &doc.path))?;
        parse_sheet_list(&out)
    }

    fn read_sheet(
        &self,
        doc: &LiveDocument,
        sheet: &SheetSelector,
    ) -> Result<SheetSnapshot, IoError> {
        let out = self.run_script(&script::read(&self.config, &doc.path, sheet))?;
        parse_read(&out)
    }

    fn set_cells_batch(
        &self,
        doc: &LiveDocument,
        sheet: &SheetTarget,
        patch: &Patch,
    ) -> Result<BackendReply, IoError> {
        self.run_for_reply(&script::batch(&self.config, &doc.path, sheet, patch))
    }

    fn change_sheets(
        &self,
        doc: &LiveDocument,
        change: &SheetChange,
    ) -> Result<BackendReply, IoError> {
        self.run_for_reply(&script::change(&self.config, &doc.path, change))
    }

    fn save(&self, doc: &LiveDocument) -> Result<BackendReply, IoError> {
        self.run_for_reply(&script::save(&self.config, &doc.path))
    }

    fn list_open_documents(&self) -> Result<Vec<OpenDocument>, IoError> {
        let out = self.run_script(&script::list_open(&self.config))?;
        parse_open_documents(&out)
    }

    fn close(
        &self,
        doc: Option<&DocumentRef>,
        options: CloseOptions,
    ) -> Result<BackendReply, IoError> {
        self.run_for_reply(&script::close(&self.config, doc.map(DocumentRef::path), options))
    }
}

/// Interpret script output. An `ERROR:` line wins over anything else; the
/// last `SUCCESS:` line is the acknowledgment.
pub fn parse_reply(stdout: &str) -> BackendReply {
    let mut ack = None;
    for line in stdout.lines().map(str::trim) {
        if let Some(msg) = line.strip_prefix("ERROR:") {
            return BackendReply::Rejected(msg.trim().to_string());
        }
        if let Some(msg) = line.strip_prefix("SUCCESS:") {
            ack = Some(msg.trim().to_string());
        }
    }
    match ack {
        Some(msg) => BackendReply::Acknowledged(msg),
        None => BackendReply::Unacknowledged(stdout.trim().to_string()),
    }
}

fn parse_sheet_list(stdout: &str) -> Result<Vec<String>, IoError> {
    for line in stdout.lines().map(|l| l.trim_end_matches('\r')) {
        if let Some(msg) = line.strip_prefix("ERROR:") {
            return Err(IoError::Script(msg.trim().to_string()));
        }
        if let Some(list) = line.strip_prefix("SHEET_LIST:") {
            return Ok(split_cells(list)
                .filter(|n| !n.is_empty())
                .collect());
        }
    }
    Err(IoError::Script("no sheet list in script output".to_string()))
}

/// Parse the read protocol into a snapshot, coercing cell text back into
/// typed values.
pub fn parse_read(stdout: &str) -> Result<SheetSnapshot, IoError> {
    let mut sheet = None;
    let mut sheets = None;
    let mut rows: Vec<Row> = Vec::new();
    let mut in_data = false;
    let mut complete = false;

    for line in stdout.lines().map(|l| l.trim_end_matches('\r')) {
        if in_data {
            if line == "DATA_END" {
                in_data = false;
                complete = true;
            } else {
                rows.push(
                    split_cells(line)
                        .map(|text| CellValue::coerce_from_text(&text))
                        .collect(),
                );
            }
            continue;
        }
        if let Some(msg) = line.strip_prefix("ERROR:") {
            return Err(IoError::Script(msg.trim().to_string()));
        } else if let Some(name) = line.strip_prefix("SHEET_INFO:") {
            sheet = Some(name.to_string());
        } else if let Some(list) = line.strip_prefix("SHEET_LIST:") {
            sheets = Some(split_cells(list).filter(|n| !n.is_empty()).collect());
        } else if line == "DATA_START" {
            in_data = true;
        } else if line == "EMPTY_SHEET" {
            complete = true;
        }
    }

    let sheet = sheet.ok_or_else(|| IoError::Script("missing SHEET_INFO".to_string()))?;
    if !complete {
        return Err(IoError::Script(format!("truncated read of sheet '{sheet}'")));
    }
    Ok(SheetSnapshot {
        sheets: sheets.unwrap_or_else(|| vec![sheet.clone()]),
        sheet,
        dataset: Dataset::from_rows(rows).trimmed(),
    })
}

/// Parse the workbook listing. A listing cut short is an error rather than
/// a shorter list.
pub fn parse_open_documents(stdout: &str) -> Result<Vec<OpenDocument>, IoError> {
    let mut docs = Vec::new();
    let mut current: Option<OpenDocument> = None;

    for line in stdout.lines().map(|l| l.trim_end_matches('\r')) {
        if line == "NO_APPLICATION" {
            return Ok(Vec::new());
        }
        if line == "LIST_END" {
            return Ok(docs);
        }
        if let Some(msg) = line.strip_prefix("ERROR:") {
            return Err(IoError::Script(msg.trim().to_string()));
        }
        if let Some(path) = line.strip_prefix("WORKBOOK:") {
            current = Some(OpenDocument {
                path: PathBuf::from(path),
                name: String::new(),
                saved: true,
                active_sheet: None,
                sheets: Vec::new(),
            });
            continue;
        }
        let Some(doc) = current.as_mut() else {
            continue;
        };
        if let Some(name) = line.strip_prefix("NAME:") {
            doc.name = name.to_string();
        } else if let Some(saved) = line.strip_prefix("SAVED:") {
            doc.saved = saved.trim().eq_ignore_ascii_case("true");
        } else if let Some(active) = line.strip_prefix("ACTIVE_SHEET:") {
            doc.active_sheet = Some(active.to_string()).filter(|a| !a.is_empty());
        } else if let Some(list) = line.strip_prefix("SHEET_LIST:") {
            doc.sheets = split_cells(list).filter(|n| !n.is_empty()).collect();
        } else if line == "WORKBOOK_END" {
            docs.extend(current.take());
        }
    }
    Err(IoError::Script("truncated workbook listing".to_string()))
}

fn split_cells(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(CELL_DELIM).map(|c| c.replace(NEWLINE_TOKEN, "\n"))
}

mod script {
    use super::*;

    /// Single-quoted PowerShell string literal. PowerShell also treats the
    /// typographic single quotes as quote characters, so those are doubled
    /// as well.
    pub fn quote(s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        for ch in s.chars() {
            if matches!(ch, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
                out.push(ch);
            }
            out.push(ch);
        }
        out.push('\'');
        out
    }

    pub fn literal(value: &CellValue) -> String {
        match value {
            CellValue::Number(n) => format!("[double]{n:?}"),
            CellValue::Boolean(true) => "$true".to_string(),
            CellValue::Boolean(false) => "$false".to_string(),
            CellValue::Text(s) => quote(s),
            CellValue::Empty => "''".to_string(),
        }
    }

    fn header(cfg: &PowerShellConfig) -> String {
        format!(
            "$ErrorActionPreference = 'Stop'\n\
             [Console]::OutputEncoding = [Text.Encoding]::UTF8\n\
             try {{\n\
             \x20   $excel = [Runtime.InteropServices.Marshal]::GetActiveObject({})\n\
             }} catch {{\n\
             \x20   Write-Output 'ERROR: application is not running'\n\
             \x20   exit 0\n\
             }}\n",
            quote(&cfg.prog_id)
        )
    }

    /// Header plus `$wb` bound to the workbook at `path`, opened if needed.
    fn workbook(cfg: &PowerShellConfig, path: &Path) -> String {
        format!(
            "{}$path = {}\n\
             $wb = $null\n\
             foreach ($w in $excel.Workbooks) {{ if ($w.FullName -eq $path) {{ $wb = $w; break }} }}\n\
             if ($null -eq $wb) {{ $wb = $excel.Workbooks.Open($path) }}\n",
            header(cfg),
            quote(&path.to_string_lossy())
        )
    }

    fn find_sheet(name: &str) -> String {
        format!(
            "$ws = $null\n\
             foreach ($s in $wb.Worksheets) {{ if ($s.Name -eq {}) {{ $ws = $s; break }} }}\n",
            quote(name)
        )
    }

    fn guarded(body: &str) -> String {
        format!(
            "try {{\n{body}}} catch {{\n\
             \x20   Write-Output ('ERROR: ' + $_.Exception.Message)\n\
             }}\n"
        )
    }

    pub fn responsive(cfg: &PowerShellConfig) -> String {
        format!(
            "$p = Get-Process -Name {} -ErrorAction SilentlyContinue\n\
             if ($null -eq $p) {{ Write-Output 'ERROR: process not running'; exit 0 }}\n\
             {}\
             if ($excel.Ready) {{ Write-Output 'SUCCESS: ready' }} else {{ Write-Output 'ERROR: application busy' }}\n",
            quote(&cfg.process_name),
            header(cfg)
        )
    }

    pub fn attach(cfg: &PowerShellConfig, path: &Path) -> String {
        guarded(&format!(
            "{}Write-Output ('SUCCESS: ' + $wb.Name)\n",
            workbook(cfg, path)
        ))
    }

    pub fn sheet_list(cfg: &PowerShellConfig, path: &Path) -> String {
        guarded(&format!(
            "{}$names = @(foreach ($s in $wb.Worksheets) {{ $s.Name }})\n\
             Write-Output ('SHEET_LIST:' + ($names -join '{CELL_DELIM}'))\n",
            workbook(cfg, path)
        ))
    }

    pub fn read(cfg: &PowerShellConfig, path: &Path, sheet: &SheetSelector) -> String {
        let select = match sheet.name() {
            Some(name) => format!(
                "{}if ($null -eq $ws) {{ $ws = $wb.Worksheets.Item(1) }}\n",
                find_sheet(name)
            ),
            None => "$ws = $wb.ActiveSheet\n".to_string(),
        };
        guarded(&format!(
            "{wb}{select}\
             Write-Output ('SHEET_INFO:' + $ws.Name)\n\
             $names = @(foreach ($s in $wb.Worksheets) {{ $s.Name }})\n\
             Write-Output ('SHEET_LIST:' + ($names -join '{CELL_DELIM}'))\n\
             if ($excel.WorksheetFunction.CountA($ws.Cells) -eq 0) {{\n\
             \x20   Write-Output 'EMPTY_SHEET'\n\
             }} else {{\n\
             \x20   $used = $ws.UsedRange\n\
             \x20   $lastRow = $used.Row + $used.Rows.Count - 1\n\
             \x20   $lastCol = $used.Column + $used.Columns.Count - 1\n\
             \x20   Write-Output 'DATA_START'\n\
             \x20   for ($r = 1; $r -le $lastRow; $r++) {{\n\
             \x20       $vals = @(for ($c = 1; $c -le $lastCol; $c++) {{\n\
             \x20           $v = $ws.Cells.Item($r, $c).Value2\n\
             \x20           if ($null -eq $v) {{ '' }} else {{ ([string]$v) -replace \"`r?`n\", '{NEWLINE_TOKEN}' }}\n\
             \x20       }})\n\
             \x20       Write-Output ($vals -join '{CELL_DELIM}')\n\
             \x20   }}\n\
             \x20   Write-Output 'DATA_END'\n\
             }}\n",
            wb = workbook(cfg, path),
        ))
    }

    fn cell_ops(patch: &Patch) -> String {
        let mut out = String::new();
        let region = patch.clear_region().filter(|r| !r.is_empty());
        if let Some(region) = region {
            let corner = CellCoord {
                row: region.rows,
                col: region.cols,
            };
            out.push_str(&format!(
                "$ws.Range('A1:{}').ClearContents() | Out-Null\n",
                corner.to_a1()
            ));
        }
        for op in patch.ops() {
            let (r, c) = (op.coord.row, op.coord.col);
            match op.kind {
                OpKind::Clear if region.is_some_and(|reg| reg.contains(op.coord)) => {}
                OpKind::Clear => {
                    out.push_str(&format!("$ws.Cells.Item({r}, {c}).ClearContents() | Out-Null\n"));
                }
                OpKind::Write => {
                    out.push_str(&format!(
                        "$ws.Cells.Item({r}, {c}).Value2 = {}\n",
                        literal(&op.value)
                    ));
                }
            }
        }
        out
    }

    const ADD_SHEET: &str =
        "$new = $wb.Worksheets.Add([Type]::Missing, $wb.Worksheets.Item($wb.Worksheets.Count))\n";

    pub fn batch(cfg: &PowerShellConfig, path: &Path, target: &SheetTarget, patch: &Patch) -> String {
        let missing = if target.create {
            format!("if ($null -eq $ws) {{\n{ADD_SHEET}$new.Name = {}\n$ws = $new\n}}\n", quote(&target.name))
        } else {
            format!(
                "if ($null -eq $ws) {{ throw ('sheet not found: ' + {}) }}\n",
                quote(&target.name)
            )
        };
        guarded(&format!(
            "{}{}{}$excel.ScreenUpdating = $false\n\
             try {{\n{}}} finally {{ $excel.ScreenUpdating = $true }}\n\
             Write-Output 'SUCCESS: {} cells written, {} cleared'\n",
            workbook(cfg, path),
            find_sheet(&target.name),
            missing,
            cell_ops(patch),
            patch.write_count(),
            patch.clear_count(),
        ))
    }

    pub fn change(cfg: &PowerShellConfig, path: &Path, change: &SheetChange) -> String {
        let body = match change {
            SheetChange::Add { name, rows } => {
                let seed = rows.as_ref().map(|r| cell_ops(&Patch::from_dataset(r))).unwrap_or_default();
                format!(
                    "{ADD_SHEET}$new.Name = {}\n$ws = $new\n{seed}Write-Output 'SUCCESS: sheet added'\n",
                    quote(name)
                )
            }
            SheetChange::Rename { from, to } => format!(
                "{}if ($null -eq $ws) {{ throw ('sheet not found: ' + {from_q}) }}\n\
                 $ws.Name = {}\n\
                 Write-Output 'SUCCESS: sheet renamed'\n",
                find_sheet(from),
                quote(to),
                from_q = quote(from),
            ),
            SheetChange::Delete { name } => format!(
                "{}if ($null -eq $ws) {{ throw ('sheet not found: ' + {q}) }}\n\
                 if ($wb.Worksheets.Count -le 1) {{ throw 'cannot delete the last remaining sheet' }}\n\
                 $excel.DisplayAlerts = $false\n\
                 try {{ $ws.Delete() | Out-Null }} finally {{ $excel.DisplayAlerts = $true }}\n\
                 Write-Output 'SUCCESS: sheet deleted'\n",
                find_sheet(name),
                q = quote(name),
            ),
        };
        guarded(&format!("{}{body}", workbook(cfg, path)))
    }

    pub fn list_open(cfg: &PowerShellConfig) -> String {
        format!(
            "$p = Get-Process -Name {} -ErrorAction SilentlyContinue\n\
             if ($null -eq $p) {{ Write-Output 'NO_APPLICATION'; exit 0 }}\n\
             {}",
            quote(&cfg.process_name),
            guarded(&format!(
                "{}foreach ($w in $excel.Workbooks) {{\n\
                 \x20   Write-Output ('WORKBOOK:' + $w.FullName)\n\
                 \x20   Write-Output ('NAME:' + $w.Name)\n\
                 \x20   Write-Output ('SAVED:' + $w.Saved)\n\
                 \x20   Write-Output ('ACTIVE_SHEET:' + $w.ActiveSheet.Name)\n\
                 \x20   $names = @(foreach ($s in $w.Worksheets) {{ $s.Name }})\n\
                 \x20   Write-Output ('SHEET_LIST:' + ($names -join '{CELL_DELIM}'))\n\
                 \x20   Write-Output 'WORKBOOK_END'\n\
                 }}\n\
                 Write-Output 'LIST_END'\n",
                header(cfg)
            ))
        )
    }

    pub fn close(cfg: &PowerShellConfig, path: Option<&Path>, options: CloseOptions) -> String {
        let save = if options.save_changes { "$true" } else { "$false" };
        let select = match path {
            Some(path) => format!(
                "$path = {}\n\
                 $name = [IO.Path]::GetFileName($path)\n\
                 $wb = $null\n\
                 foreach ($w in $excel.Workbooks) {{ if ($w.FullName -eq $path -or $w.Name -eq $name) {{ $wb = $w; break }} }}\n\
                 if ($null -eq $wb) {{ throw ('workbook not open: ' + $path) }}\n\
                 $wb.Close({save})\n\
                 $closed = 1\n",
                quote(&path.to_string_lossy())
            ),
            None => format!(
                "while ($excel.Workbooks.Count -gt 0) {{ $excel.Workbooks.Item(1).Close({save}); $closed++ }}\n"
            ),
        };
        let quit = if options.quit_application {
            "$excel.Quit()\n"
        } else {
            ""
        };
        guarded(&format!(
            "try {{\n\
             \x20   $excel = [Runtime.InteropServices.Marshal]::GetActiveObject({})\n\
             }} catch {{\n\
             \x20   Write-Output 'SUCCESS: application is not running'\n\
             \x20   exit 0\n\
             }}\n\
             $closed = 0\n\
             $excel.DisplayAlerts = $false\n\
             try {{\n{select}}} finally {{ $excel.DisplayAlerts = $true }}\n\
             {quit}\
             Write-Output ('SUCCESS: closed ' + $closed + ' workbook(s)')\n",
            quote(&cfg.prog_id)
        ))
    }

    pub fn save(cfg: &PowerShellConfig, path: &Path) -> String {
        guarded(&format!(
            "{}$wb.Save()\nWrite-Output 'SUCCESS: saved'\n",
            workbook(cfg, path)
        ))
    }
}
