//! Descriptive statistics over merged grids
//!
//! Per (layer, head, field): count, mean and sample standard deviation.
//! Used for the console report after a run; no hypothesis testing.

use statrs::statistics::Statistics;

use crate::grid::{FeatureField, FeatureGrid};

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSummary {
    pub layer: usize,
    pub head: usize,
    pub field: FeatureField,
    pub n: usize,
    pub mean: f64,
    /// NaN below two examples
    pub std_dev: f64,
}

#[derive(Debug, Clone)]
pub struct BucketSummary {
    pub name: String,
    pub n_layers: usize,
    pub n_heads: usize,
    /// Examples in the bucket, `None` if cells disagree
    pub n_examples: Option<usize>,
    pub fields: Vec<FieldSummary>,
}

impl BucketSummary {
    pub fn get(&self, layer: usize, head: usize, field: FeatureField) -> Option<&FieldSummary> {
        self.fields
            .iter()
            .find(|s| s.layer == layer && s.head == head && s.field == field)
    }

    /// Layer x head matrix of means for one field
    pub fn mean_matrix(&self, field: FeatureField) -> Vec<Vec<f64>> {
        let mut matrix = vec![vec![f64::NAN; self.n_heads]; self.n_layers];
        for s in self.fields.iter().filter(|s| s.field == field) {
            matrix[s.layer][s.head] = s.mean;
        }
        matrix
    }
}

/// Summarize every populated cell of a grid
pub fn summarize(name: &str, grid: &FeatureGrid) -> BucketSummary {
    let mut fields = Vec::new();
    for (layer, head, cell) in grid.iter() {
        if cell.is_empty() {
            continue;
        }
        for field in FeatureField::ALL {
            let values: Vec<f64> = cell.values(field).into_iter().map(f64::from).collect();
            if values.is_empty() {
                continue;
            }
            let (mean, std_dev) = if values.len() > 1 {
                (values.iter().mean(), values.iter().std_dev())
            } else {
                (values[0], f64::NAN)
            };
            fields.push(FieldSummary {
                layer,
                head,
                field,
                n: values.len(),
                mean,
                std_dev,
            });
        }
    }

    BucketSummary {
        name: name.to_string(),
        n_layers: grid.rows(),
        n_heads: grid.cols(),
        n_examples: grid.batch_size(),
        fields,
    }
}

/// Print the means of a bucket, one line per (layer, head)
pub fn print_summary(summary: &BucketSummary) {
    let n = summary
        .n_examples
        .map_or_else(|| "uneven".to_string(), |n| n.to_string());
    println!("\n{} (n = {})", summary.name, n);
    if summary.fields.is_empty() {
        println!("  (empty)");
        return;
    }
    let shown = [
        FeatureField::WordInitial,
        FeatureField::Preceding,
        FeatureField::Syl0Sum,
        FeatureField::Syl1Sum,
        FeatureField::Syl2Sum,
    ];
    print!("  {:>5} {:>4}", "layer", "head");
    for field in shown {
        print!(" {:>12}", field.name());
    }
    println!();
    for layer in 0..summary.n_layers {
        for head in 0..summary.n_heads {
            print!("  {layer:>5} {head:>4}");
            for field in shown {
                match summary.get(layer, head, field) {
                    Some(s) => print!(" {:>12.4}", s.mean),
                    None => print!(" {:>12}", "-"),
                }
            }
            println!();
        }
    }
}
