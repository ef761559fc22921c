use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{column_letters, escape_xml, WorkbookError};

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const WORKSHEET_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const STYLES_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

/// Style index of the bold header font in the generated stylesheet
const HEADER_STYLE: usize = 1;

/// A list-type data validation (dropdown) applied to a cell range
#[derive(Debug, Clone, PartialEq)]
pub struct ListValidation {
    /// Target range, e.g. `D2:D501` or `E7`
    pub sqref: String,
    /// List source formula without the leading `=`
    pub formula: String,
    /// Message shown when a value outside the list is entered
    pub error_message: Option<String>,
}

/// One worksheet to be written
#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
    pub hidden: bool,
    pub bold_header: bool,
    pub column_widths: Vec<f64>,
    pub validations: Vec<ListValidation>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Serialize worksheets into an xlsx package. The first sheet must be visible.
pub fn write_workbook(sheets: &[Worksheet]) -> Result<Vec<u8>, WorkbookError> {
    if sheets.first().map(|s| s.hidden).unwrap_or(true) {
        return Err(WorkbookError::InvalidLayout(
            "the first worksheet must exist and be visible".to_string(),
        ));
    }

    let mut output = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut output);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut parts: Vec<(String, String)> = vec![
            ("[Content_Types].xml".to_string(), content_types_xml(sheets.len())),
            ("_rels/.rels".to_string(), root_rels_xml()),
            ("xl/workbook.xml".to_string(), workbook_xml(sheets)),
            ("xl/_rels/workbook.xml.rels".to_string(), workbook_rels_xml(sheets.len())),
            ("xl/styles.xml".to_string(), styles_xml()),
        ];
        for (index, sheet) in sheets.iter().enumerate() {
            parts.push((format!("xl/worksheets/sheet{}.xml", index + 1), worksheet_xml(sheet)));
        }

        for (name, content) in parts {
            writer.start_file(name, options)?;
            writer.write_all(content.as_bytes())?;
        }

        writer.finish()?;
    }

    Ok(output.into_inner())
}

fn content_types_xml(sheet_count: usize) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str("<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">");
    xml.push_str("<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>");
    xml.push_str("<Default Extension=\"xml\" ContentType=\"application/xml\"/>");
    xml.push_str("<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>");
    xml.push_str("<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>");
    for index in 1..=sheet_count {
        xml.push_str(&format!(
            "<Override PartName=\"/xl/worksheets/sheet{}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
            index
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn root_rels_xml() -> String {
    format!(
        "{}<Relationships xmlns=\"{}\"><Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/></Relationships>",
        XML_HEADER, PACKAGE_REL_NS
    )
}

fn workbook_xml(sheets: &[Worksheet]) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str(&format!("<workbook xmlns=\"{}\" xmlns:r=\"{}\"><sheets>", MAIN_NS, REL_NS));
    for (index, sheet) in sheets.iter().enumerate() {
        let state = if sheet.hidden { " state=\"hidden\"" } else { "" };
        xml.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{}\"{} r:id=\"rId{}\"/>",
            escape_xml(&sheet.name),
            index + 1,
            state,
            index + 1
        ));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels_xml(sheet_count: usize) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str(&format!("<Relationships xmlns=\"{}\">", PACKAGE_REL_NS));
    for index in 1..=sheet_count {
        xml.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"{}\" Target=\"worksheets/sheet{}.xml\"/>",
            index, WORKSHEET_REL_TYPE, index
        ));
    }
    xml.push_str(&format!(
        "<Relationship Id=\"rId{}\" Type=\"{}\" Target=\"styles.xml\"/>",
        sheet_count + 1,
        STYLES_REL_TYPE
    ));
    xml.push_str("</Relationships>");
    xml
}

fn styles_xml() -> String {
    format!(
        "{}<styleSheet xmlns=\"{}\">\
<fonts count=\"2\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font><font><b/><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>\
<fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill><fill><patternFill patternType=\"gray125\"/></fill></fills>\
<borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>\
<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>\
<cellXfs count=\"2\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/><xf numFmtId=\"0\" fontId=\"1\" fillId=\"0\" borderId=\"0\" xfId=\"0\" applyFont=\"1\"/></cellXfs>\
<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>\
</styleSheet>",
        XML_HEADER, MAIN_NS
    )
}

fn worksheet_xml(sheet: &Worksheet) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str(&format!("<worksheet xmlns=\"{}\" xmlns:r=\"{}\">", MAIN_NS, REL_NS));

    if !sheet.column_widths.is_empty() {
        xml.push_str("<cols>");
        for (index, width) in sheet.column_widths.iter().enumerate() {
            xml.push_str(&format!(
                "<col min=\"{0}\" max=\"{0}\" width=\"{1}\" customWidth=\"1\"/>",
                index + 1,
                width
            ));
        }
        xml.push_str("</cols>");
    }

    xml.push_str("<sheetData>");
    for (row_index, row) in sheet.rows.iter().enumerate() {
        xml.push_str(&format!("<row r=\"{}\">", row_index + 1));
        for (column_index, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let style = if sheet.bold_header && row_index == 0 {
                format!(" s=\"{}\"", HEADER_STYLE)
            } else {
                String::new()
            };
            xml.push_str(&format!(
                "<c r=\"{}{}\" t=\"inlineStr\"{}><is><t xml:space=\"preserve\">{}</t></is></c>",
                column_letters(column_index),
                row_index + 1,
                style,
                escape_xml(value)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");

    if !sheet.validations.is_empty() {
        xml.push_str(&format!("<dataValidations count=\"{}\">", sheet.validations.len()));
        for validation in &sheet.validations {
            xml.push_str(&format!(
                "<dataValidation type=\"list\" allowBlank=\"1\" showInputMessage=\"1\" showErrorMessage=\"1\" sqref=\"{}\"",
                escape_xml(&validation.sqref)
            ));
            if let Some(message) = &validation.error_message {
                xml.push_str(&format!(" error=\"{}\"", escape_xml(message)));
            }
            xml.push_str(&format!(
                "><formula1>{}</formula1></dataValidation>",
                escape_xml(&validation.formula)
            ));
        }
        xml.push_str("</dataValidations>");
    }

    xml.push_str("</worksheet>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::read_first_sheet;
    use std::io::Read;
    use zip::ZipArchive;

    fn part(data: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        content
    }

    fn sample_sheets() -> Vec<Worksheet> {
        let mut visible = Worksheet::new("Metadata");
        visible.bold_header = true;
        visible.rows = vec![
            vec!["name".to_string(), "notes".to_string()],
            vec!["a & b".to_string(), String::new(), "<c>".to_string()],
        ];
        visible.validations.push(ListValidation {
            sqref: "B2:B10".to_string(),
            formula: "Lists!$A$1:$A$3".to_string(),
            error_message: Some("Pick a value".to_string()),
        });

        let mut hidden = Worksheet::new("Lists");
        hidden.hidden = true;
        hidden.rows = vec![vec!["x".to_string()], vec!["y".to_string()]];

        vec![visible, hidden]
    }

    #[test]
    fn written_workbook_reads_back_first_sheet() {
        let data = write_workbook(&sample_sheets()).unwrap();
        let rows = read_first_sheet(&data).unwrap();

        assert_eq!(rows[0], vec!["name", "notes"]);
        assert_eq!(rows[1], vec!["a & b", "", "<c>"]);
    }

    #[test]
    fn hidden_sheets_are_marked_in_workbook_part() {
        let data = write_workbook(&sample_sheets()).unwrap();
        let workbook = part(&data, "xl/workbook.xml");

        assert!(workbook.contains("<sheet name=\"Metadata\" sheetId=\"1\" r:id=\"rId1\"/>"));
        assert!(workbook.contains("<sheet name=\"Lists\" sheetId=\"2\" state=\"hidden\" r:id=\"rId2\"/>"));
    }

    #[test]
    fn validations_are_written_after_sheet_data() {
        let data = write_workbook(&sample_sheets()).unwrap();
        let sheet = part(&data, "xl/worksheets/sheet1.xml");

        let data_end = sheet.find("</sheetData>").unwrap();
        let validations = sheet.find("<dataValidations count=\"1\">").unwrap();
        assert!(validations > data_end);
        assert!(sheet.contains("sqref=\"B2:B10\""));
        assert!(sheet.contains("error=\"Pick a value\""));
        assert!(sheet.contains("<formula1>Lists!$A$1:$A$3</formula1>"));
    }

    #[test]
    fn header_row_uses_bold_style() {
        let data = write_workbook(&sample_sheets()).unwrap();
        let sheet = part(&data, "xl/worksheets/sheet1.xml");

        assert!(sheet.contains("<c r=\"A1\" t=\"inlineStr\" s=\"1\">"));
        assert!(sheet.contains("<c r=\"A2\" t=\"inlineStr\">"));
    }

    #[test]
    fn rejects_hidden_first_sheet() {
        let mut sheet = Worksheet::new("Only");
        sheet.hidden = true;
        assert!(write_workbook(&[sheet]).is_err());
        assert!(write_workbook(&[]).is_err());
    }
}
