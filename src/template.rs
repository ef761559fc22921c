//! Sample bulk upload archive with a metadata workbook whose category and
//! subcategory columns are dropdowns fed by the catalog.

use std::io::{Cursor, Write};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::archive::{RequiredExtension, METADATA_FILE_NAME};
use crate::catalog::{load_tree, CatalogError, CatalogSource, Category, Subcategory};
use crate::workbook::{write_workbook, ListValidation, Worksheet, WorkbookError};

/// Sample design folders included in the template
pub const TEMPLATE_FOLDERS: [&str; 3] = ["design_001", "design_002", "design_003"];

/// Data rows (below the header) that get a subcategory dropdown
pub const DROPDOWN_ROWS: usize = 500;

pub const DEFAULT_TEMPLATE_NAME: &str = "bulk_upload_template.zip";

const METADATA_SHEET: &str = "Metadata";
const CATEGORIES_SHEET: &str = "Categories";
const SUBCATEGORIES_SHEET: &str = "Subcategories";

const HEADER: [&str; 6] = [
    "folder_name (must match the design folder name)",
    "title (design title shown to buyers)",
    "description (short description)",
    "category (pick from the list)",
    "subcategory (pick after choosing a category)",
    "tags (comma separated)",
];

const COLUMN_WIDTHS: [f64; 6] = [32.0, 30.0, 40.0, 24.0, 28.0, 30.0];

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to load categories: {0}")]
    Catalog(#[from] CatalogError),

    #[error("failed to build metadata.xlsx: {0}")]
    Workbook(#[from] WorkbookError),

    #[error("failed to write template archive: {0}")]
    Zip(#[from] ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the template archive using categories from `catalog`.
pub fn generate_template(catalog: &dyn CatalogSource) -> Result<Vec<u8>, TemplateError> {
    let tree = load_tree(catalog)?;
    if tree.is_empty() {
        tracing::warn!("catalog has no categories; template will not include dropdowns");
    }

    let metadata = metadata_workbook(&tree)?;

    let mut output = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut output);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (index, folder) in TEMPLATE_FOLDERS.iter().enumerate() {
            writer.add_directory(format!("{}/", folder), options)?;
            for ext in RequiredExtension::ALL {
                writer.start_file(format!("{}/{}{}", folder, folder, ext), options)?;
            }
            if index == 0 {
                writer.start_file(format!("{}/mockup.jpg", folder), options)?;
            }
        }

        writer.start_file(METADATA_FILE_NAME, options)?;
        writer.write_all(&metadata)?;
        writer.finish()?;
    }

    let bytes = output.into_inner();
    tracing::info!(
        categories = tree.len(),
        bytes = bytes.len(),
        "generated bulk upload template"
    );
    Ok(bytes)
}

/// The three-sheet metadata workbook: visible `Metadata` plus hidden lookup sheets.
pub fn metadata_workbook(tree: &[(Category, Vec<Subcategory>)]) -> Result<Vec<u8>, WorkbookError> {
    let mut metadata = Worksheet::new(METADATA_SHEET);
    metadata.bold_header = true;
    metadata.column_widths = COLUMN_WIDTHS.to_vec();
    metadata.rows.push(HEADER.iter().map(|h| h.to_string()).collect());
    metadata.rows.extend(sample_rows(tree));

    let mut categories = Worksheet::new(CATEGORIES_SHEET);
    categories.hidden = true;
    categories.rows = tree.iter().map(|(c, _)| vec![c.name.clone()]).collect();

    let mut subcategories = Worksheet::new(SUBCATEGORIES_SHEET);
    subcategories.hidden = true;
    subcategories.rows = tree
        .iter()
        .flat_map(|(category, subs)| {
            subs.iter()
                .map(move |sub| vec![category.name.clone(), sub.name.clone()])
        })
        .collect();

    if !categories.rows.is_empty() {
        metadata.validations.push(ListValidation {
            sqref: format!("D2:D{}", DROPDOWN_ROWS + 1),
            formula: format!("{}!$A$1:$A${}", CATEGORIES_SHEET, categories.rows.len()),
            error_message: Some("Choose a category from the list.".to_string()),
        });
    }
    if !subcategories.rows.is_empty() {
        metadata
            .validations
            .extend((2..=DROPDOWN_ROWS + 1).map(subcategory_validation));
    }

    write_workbook(&[metadata, categories, subcategories])
}

/// Dropdown for one row's subcategory cell, limited to the category chosen in column D.
fn subcategory_validation(row: usize) -> ListValidation {
    ListValidation {
        sqref: format!("E{}", row),
        formula: format!(
            "OFFSET({sheet}!$B$1,MATCH($D{row},{sheet}!$A:$A,0)-1,0,COUNTIF({sheet}!$A:$A,$D{row}),1)",
            sheet = SUBCATEGORIES_SHEET,
            row = row
        ),
        error_message: Some("Choose a subcategory of the selected category.".to_string()),
    }
}

fn sample_rows(tree: &[(Category, Vec<Subcategory>)]) -> Vec<Vec<String>> {
    let (category, subcategory) = tree
        .iter()
        .find(|(_, subs)| !subs.is_empty())
        .or_else(|| tree.first())
        .map(|(c, subs)| {
            (
                c.name.clone(),
                subs.first().map(|s| s.name.clone()).unwrap_or_default(),
            )
        })
        .unwrap_or_default();

    TEMPLATE_FOLDERS
        .iter()
        .enumerate()
        .map(|(index, folder)| {
            vec![
                folder.to_string(),
                format!("Sample design {}", index + 1),
                format!("Describe sample design {} here", index + 1),
                category.clone(),
                subcategory.clone(),
                "sample, design, tags".to_string(),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::scan_archive;
    use crate::catalog::{CatalogEntry, StaticCatalog};
    use crate::validation::validate_archive;
    use crate::workbook::read_first_sheet;
    use std::io::Read;
    use zip::ZipArchive;

    fn catalog() -> StaticCatalog {
        StaticCatalog {
            minimum: None,
            categories: vec![
                CatalogEntry {
                    id: 1,
                    name: "Floral".to_string(),
                    subcategories: vec![
                        Subcategory { id: 10, name: "Roses".to_string() },
                        Subcategory { id: 11, name: "Tulips".to_string() },
                    ],
                },
                CatalogEntry {
                    id: 2,
                    name: "Abstract & Geometric".to_string(),
                    subcategories: vec![Subcategory { id: 20, name: "Lines".to_string() }],
                },
            ],
        }
    }

    fn entry(data: &[u8], name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut content = Vec::new();
        file.read_to_end(&mut content).unwrap();
        content
    }

    fn part(xlsx: &[u8], name: &str) -> String {
        String::from_utf8(entry(xlsx, name)).unwrap()
    }

    #[test]
    fn template_passes_validation() {
        let zip = generate_template(&catalog()).unwrap();
        let report = validate_archive(&zip, 3);

        assert!(report.valid, "unexpected errors: {:?}", report.messages());
        assert_eq!(report.design_count, 3);
    }

    #[test]
    fn template_contains_sample_folders_and_mockup() {
        let zip = generate_template(&catalog()).unwrap();
        let scan = scan_archive(&zip).unwrap();

        let names: Vec<&str> = scan.folders.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, TEMPLATE_FOLDERS.to_vec());
        assert!(scan.folders.folders[0].has_mockup);
        assert!(!scan.folders.folders[1].has_mockup);
        assert_eq!(scan.metadata_path.as_deref(), Some(METADATA_FILE_NAME));
    }

    #[test]
    fn metadata_rows_use_catalog_values() {
        let zip = generate_template(&catalog()).unwrap();
        let rows = read_first_sheet(&entry(&zip, METADATA_FILE_NAME)).unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1][0], "design_001");
        assert_eq!(rows[1][3], "Floral");
        assert_eq!(rows[1][4], "Roses");
    }

    #[test]
    fn dropdowns_reference_hidden_sheets() {
        let xlsx = metadata_workbook(&crate::catalog::load_tree(&catalog()).unwrap()).unwrap();

        let workbook = part(&xlsx, "xl/workbook.xml");
        assert!(workbook.contains("name=\"Categories\" sheetId=\"2\" state=\"hidden\""));
        assert!(workbook.contains("name=\"Subcategories\" sheetId=\"3\" state=\"hidden\""));

        let sheet = part(&xlsx, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("sqref=\"D2:D501\""));
        assert!(sheet.contains("<formula1>Categories!$A$1:$A$2</formula1>"));
        assert!(sheet.contains(
            "<formula1>OFFSET(Subcategories!$B$1,MATCH($D2,Subcategories!$A:$A,0)-1,0,COUNTIF(Subcategories!$A:$A,$D2),1)</formula1>"
        ));
        assert!(sheet.contains("sqref=\"E501\""));
        assert!(!sheet.contains("sqref=\"E502\""));

        let subcategories = part(&xlsx, "xl/worksheets/sheet3.xml");
        assert!(subcategories.contains("Abstract &amp; Geometric"));
    }

    #[test]
    fn empty_catalog_omits_dropdowns() {
        let zip = generate_template(&StaticCatalog::default()).unwrap();
        let sheet = part(&entry(&zip, METADATA_FILE_NAME), "xl/worksheets/sheet1.xml");

        assert!(!sheet.contains("<dataValidations"));
        assert!(validate_archive(&zip, 3).valid);
    }
}
