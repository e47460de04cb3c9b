//! Report tools of the standard catalog
//!
//! Wraps the file-backed loaders of `biomarker_tools` into [`ReportTool`]s.
//! Each tool owns an [`IdentifierResolver`] translating cohort ids into the
//! namespace its documents are stored under.

use anyhow::Result;
use async_trait::async_trait;
use biomarker_tools::{load_description, load_patient_document, DescriptionSource, ReportTable};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::catalog::{ReportCatalog, ReportTool};
use crate::patient::{IdentifierResolver, IdentityResolver, PatientId, TrimSuffixResolver};

/// Spatial transcriptomics heatmap features: (tool key, file feature)
pub const HEATMAP_FEATURES: &[(&str, &str)] = &[
    ("b_cell", "B_cell"),
    ("cdk12", "CDK12"),
    ("dc", "DC"),
    ("egfr", "EGFR"),
    ("erbb2", "ERBB2"),
    ("endothelial", "Endothelial"),
    ("epithelial", "Epithelial"),
    ("fgfr3", "FGFR3"),
    ("fibroblast", "Fibroblast"),
    ("granulocyte", "Granulocyte"),
    ("il1b", "IL1B"),
    ("krt7", "KRT7"),
    ("malignant_bladder", "Malignant_bladder"),
    ("mast", "Mast"),
    ("momac", "MoMac"),
    ("muscle", "Muscle"),
    ("other", "Other"),
    ("pik3ca", "PIK3CA"),
    ("plasma", "Plasma"),
    ("rb1", "RB1"),
    ("s100a8", "S100A8"),
    ("tp53", "TP53"),
    ("t_nk", "T_NK"),
];

/// Bulk RNA-seq pathway signatures
pub const PATHWAYS: &[&str] = &[
    "fgfr3",
    "egfr",
    "pi3k",
    "anti_pd1",
    "tgf_beta",
    "hypoxia",
    "emt",
    "cell_cycle",
    "ddr_deficiency",
    "p53",
];

/// Genomic data types
pub const GENOMIC_DATA_TYPES: &[&str] = &["snv_indel", "cnv", "cna", "gii", "tmb"];

/// Histopathology reports: (tool name, subdirectory, heading)
pub const HISTOPATHOLOGY_REPORTS: &[(&str, &str, &str)] = &[
    (
        "load_histopathological_immune_infiltration_report",
        "hipe_reports_immune_mw",
        "Histopathological assessment of the tumor immune infiltration",
    ),
    (
        "load_histopathological_tumor_stroma_compartments_report",
        "hipe_reports_tumor_stroma_compartments_mw",
        "Histopathological assessment of the tumor stroma compartments",
    ),
    (
        "load_histopathological_tumor_nuclear_morphometry_report",
        "hipe_reports_nuclear_morphometry_mw",
        "Histopathological assessment of the tumor nuclear morphometry",
    ),
];

pub const CLINICAL_TOOL: &str = "load_clinical_report";
pub const CLINICAL_TABLE: &str = "clinical.json";

/// A report read from a per-patient, per-feature description document
pub struct DescriptionReportTool {
    name: String,
    description: String,
    source: Arc<DescriptionSource>,
    feature: String,
    resolver: Arc<dyn IdentifierResolver>,
}

impl DescriptionReportTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        source: Arc<DescriptionSource>,
        feature: impl Into<String>,
        resolver: Arc<dyn IdentifierResolver>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            source,
            feature: feature.into(),
            resolver,
        }
    }
}

#[async_trait]
impl ReportTool for DescriptionReportTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn report(&self, patient_id: &PatientId) -> Result<String> {
        let id = self.resolver.normalize(patient_id.as_str());
        Ok(load_description(&self.source, &id, &self.feature)
            .await
            .into_text())
    }
}

/// A free-text report found by patient prefix in a directory
pub struct DocumentReportTool {
    name: String,
    source: DescriptionSource,
    resolver: Arc<dyn IdentifierResolver>,
}

#[async_trait]
impl ReportTool for DocumentReportTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.source.title
    }

    async fn report(&self, patient_id: &PatientId) -> Result<String> {
        let id = self.resolver.normalize(patient_id.as_str());
        Ok(load_patient_document(&self.source, &id).await.into_text())
    }
}

/// A report looked up in a whole-cohort table, loaded on first use
pub struct TableReportTool {
    name: String,
    description: String,
    path: PathBuf,
    table: OnceCell<ReportTable>,
    resolver: Arc<dyn IdentifierResolver>,
}

impl TableReportTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        path: impl Into<PathBuf>,
        resolver: Arc<dyn IdentifierResolver>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            path: path.into(),
            table: OnceCell::new(),
            resolver,
        }
    }
}

#[async_trait]
impl ReportTool for TableReportTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn report(&self, patient_id: &PatientId) -> Result<String> {
        let table = self
            .table
            .get_or_try_init(|| ReportTable::load(&self.path))
            .await?;
        let id = self.resolver.normalize(patient_id.as_str());
        Ok(table.get(&id).into_text())
    }
}

/// Build the catalog of every report family found under `reports_dir`.
///
/// `heatmap_resolver` maps cohort ids into the spatial transcriptomics
/// namespace; pathway documents drop the trailing sample suffix.
pub fn standard_catalog(
    reports_dir: impl AsRef<Path>,
    heatmap_resolver: Arc<dyn IdentifierResolver>,
) -> ReportCatalog {
    let root = reports_dir.as_ref();
    let identity: Arc<dyn IdentifierResolver> = Arc::new(IdentityResolver);
    let trim_sample: Arc<dyn IdentifierResolver> = Arc::new(TrimSuffixResolver::new("a"));
    let mut catalog = ReportCatalog::new();

    let heatmaps = Arc::new(DescriptionSource::new(
        root,
        "heatmaps/descriptions",
        "description",
        "Heatmap Description",
    ));
    for (key, feature) in HEATMAP_FEATURES {
        catalog.register(Arc::new(DescriptionReportTool::new(
            format!("load_{}_heatmap_report", key),
            format!("Spatial distribution of {} in the tissue sample", feature),
            heatmaps.clone(),
            *feature,
            heatmap_resolver.clone(),
        )));
    }

    let pathways = Arc::new(
        DescriptionSource::new(
            root,
            "bulk_rna_pathways/descriptions",
            "summary",
            "Pathway Analysis",
        )
        .with_score_field("pathway_score")
        .with_kind("pathway")
        .uppercase_feature(),
    );
    for pathway in PATHWAYS {
        catalog.register(Arc::new(DescriptionReportTool::new(
            format!("load_{}_pathway_report", pathway),
            format!("Bulk RNA-seq {} pathway activity", pathway.to_uppercase()),
            pathways.clone(),
            *pathway,
            trim_sample.clone(),
        )));
    }

    let genomic = Arc::new(
        DescriptionSource::new(
            root,
            "mutated_genes/descriptions",
            "summary",
            "Genomic Analysis",
        )
        .with_kind("data type")
        .uppercase_feature(),
    );
    for data_type in GENOMIC_DATA_TYPES {
        catalog.register(Arc::new(DescriptionReportTool::new(
            format!("load_{}_genomic_report", data_type),
            format!("Genomic {} analysis", data_type.to_uppercase()),
            genomic.clone(),
            *data_type,
            identity.clone(),
        )));
    }

    for (name, subdir, title) in HISTOPATHOLOGY_REPORTS {
        catalog.register(Arc::new(DocumentReportTool {
            name: name.to_string(),
            source: DescriptionSource::new(root, *subdir, "", *title),
            resolver: identity.clone(),
        }));
    }

    catalog.register(Arc::new(TableReportTool::new(
        CLINICAL_TOOL,
        "Demographics, staging, medications and treatment history",
        root.join(CLINICAL_TABLE),
        identity,
    )));

    catalog
}
