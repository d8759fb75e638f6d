use tabled::{settings::Style, Table, Tabled};

use crate::prediction::{Prediction, PredictionStats};
use crate::ui::class_badge;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
pub struct PredictionRow {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Image")]
    pub image: String,
    #[tabled(rename = "Class")]
    pub class: String,
    #[tabled(rename = "Confidence")]
    pub confidence: String,
    #[tabled(rename = "Bleached")]
    pub bleached: String,
    #[tabled(rename = "Healthy")]
    pub healthy: String,
    #[tabled(rename = "Created")]
    pub created: String,
}

impl From<&Prediction> for PredictionRow {
    fn from(p: &Prediction) -> Self {
        Self {
            id: p.id,
            image: p.image_name.clone(),
            class: class_badge(p.predicted_class),
            confidence: format!("{:.1}%", p.confidence),
            bleached: format!("{:.1}%", p.probability_bleached),
            healthy: format!("{:.1}%", p.probability_healthy),
            created: p.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &PredictionStats) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row("Total", &stats.total.to_string());
    builder.add_row("Healthy", &stats.healthy.to_string());
    builder.add_row("Bleached", &stats.bleached.to_string());
    builder.add_row("Pending", &stats.pending().to_string());
    builder.build()
}

pub fn predictions_table(predictions: &[Prediction]) -> String {
    let rows: Vec<PredictionRow> = predictions.iter().map(PredictionRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
