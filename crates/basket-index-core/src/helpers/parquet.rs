//! Parquet as a tree format.
//!
//! Mapping used by [`ParquetTreeReader`]:
//!
//! | tree concept | Parquet |
//! |---|---|
//! | tree name | name of the root message type |
//! | branch | leaf column, named by its dotted path |
//! | basket | one column chunk in one row group |
//! | basket stop | cumulative row count at the end of the row group |
//! | descriptor | physical/logical/converted type plus definition and repetition levels |
//!
//! Only the footer is decoded, so collecting a large file costs one small
//! read at its end.

use std::fs::File;
use std::path::Path;

use parquet::basic::{LogicalType, Repetition, TimeUnit, Type as PhysicalType};
use parquet::file::metadata::ParquetMetaData;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::schema::types::ColumnDescriptor;
use serde_json::json;
use snafu::prelude::*;

use crate::collect::tree_reader::{
    BranchLayout, DecodeSnafu, OpenSnafu, TreeLayout, TreeReadError, TreeReader,
};
use crate::metadata::Interpretation;

/// Reads tree layouts from Parquet footers on the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParquetTreeReader;

impl TreeReader for ParquetTreeReader {
    fn read_tree(&self, path: &Path, tree: &str) -> Result<TreeLayout, TreeReadError> {
        let path_str = path.display().to_string();
        let file = File::open(path).context(OpenSnafu {
            path: path_str.clone(),
        })?;
        let reader = SerializedFileReader::new(file)
            .boxed()
            .context(DecodeSnafu {
                path: path_str.clone(),
            })?;
        tree_layout_from_metadata(&path_str, tree, reader.metadata())
    }
}

/// Build a [`TreeLayout`] from already-decoded Parquet metadata.
pub fn tree_layout_from_metadata(
    path: &str,
    tree: &str,
    meta: &ParquetMetaData,
) -> Result<TreeLayout, TreeReadError> {
    let descr = meta.file_metadata().schema_descr();
    let root = descr.root_schema().name();
    if root != tree {
        return Err(TreeReadError::TreeNotFound {
            path: path.to_string(),
            tree: tree.to_string(),
            found: root.to_string(),
        });
    }

    // A negative row count only comes from a corrupt footer; report no entries.
    let num_entries = u64::try_from(meta.file_metadata().num_rows()).unwrap_or(0);

    let num_baskets = meta.num_row_groups();
    let mut branches = Vec::with_capacity(descr.num_columns());
    for (col_idx, col) in descr.columns().iter().enumerate() {
        let mut basket_seek = Vec::with_capacity(num_baskets);
        let mut basket_entry = Vec::with_capacity(num_baskets);
        let mut basket_bytes = Vec::with_capacity(num_baskets);
        let mut stop = 0u64;

        for rg in meta.row_groups() {
            let (start, len) = rg.column(col_idx).byte_range();
            stop += u64::try_from(rg.num_rows()).unwrap_or(0);
            basket_seek.push(start);
            basket_entry.push(stop);
            basket_bytes.push(len);
        }

        branches.push(BranchLayout {
            name: col.path().string(),
            interpretation: interpretation_for_column(col),
            basket_seek,
            basket_entry,
            basket_bytes,
        });
    }

    Ok(TreeLayout {
        num_entries,
        branches,
    })
}

/// Derive the decoding descriptor of a leaf column.
///
/// The cache key covers everything that changes how a chunk's bytes decode;
/// the column path is deliberately left out so renamed-but-identical columns
/// share a key.
pub fn interpretation_for_column(col: &ColumnDescriptor) -> Interpretation {
    let physical = col.physical_type();
    let logical = col.logical_type_ref();
    let converted = col.converted_type();
    let repetition = col.self_type().get_basic_info().repetition();
    let type_length = if physical == PhysicalType::FIXED_LEN_BYTE_ARRAY {
        Some(col.type_length())
    } else {
        None
    };

    let cache_key = format!(
        "{physical};{};{converted};{repetition};def={};rep={};len={}",
        logical.map(|l| format!("{l:?}")).unwrap_or_default(),
        col.max_def_level(),
        col.max_rep_level(),
        type_length.unwrap_or(-1),
    );

    let typename = typename(physical, logical, type_length, col.max_rep_level() > 0);

    Interpretation::new(cache_key, typename).with_detail(json!({
        "column_path": col.path().parts(),
        "physical_type": physical.to_string(),
        "logical_type": logical.map(|l| format!("{l:?}")),
        "converted_type": converted.to_string(),
        "repetition": repetition.to_string(),
        "nullable": repetition != Repetition::REQUIRED,
        "max_def_level": col.max_def_level(),
        "max_rep_level": col.max_rep_level(),
        "type_length": type_length,
    }))
}

/// Short, readable type name; logical annotations win over physical types.
fn typename(
    physical: PhysicalType,
    logical: Option<&LogicalType>,
    type_length: Option<i32>,
    repeated: bool,
) -> String {
    let base = match logical {
        Some(LogicalType::String) => "string".to_string(),
        Some(LogicalType::Timestamp { unit, .. }) => {
            let unit = match unit {
                TimeUnit::MILLIS => "ms",
                TimeUnit::MICROS => "us",
                TimeUnit::NANOS => "ns",
            };
            format!("timestamp[{unit}]")
        }
        Some(LogicalType::Decimal { scale, precision }) => format!("decimal({precision},{scale})"),
        _ => match physical {
            PhysicalType::BOOLEAN => "bool".to_string(),
            PhysicalType::INT32 => "int32".to_string(),
            PhysicalType::INT64 => "int64".to_string(),
            PhysicalType::INT96 => "int96".to_string(),
            PhysicalType::FLOAT => "float32".to_string(),
            PhysicalType::DOUBLE => "float64".to_string(),
            PhysicalType::BYTE_ARRAY => "bytes".to_string(),
            PhysicalType::FIXED_LEN_BYTE_ARRAY => {
                format!("bytes[{}]", type_length.unwrap_or_default())
            }
        },
    };
    if repeated { format!("{base}[]") } else { base }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::column::writer::ColumnWriter;
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::types::Type;
    use std::sync::Arc;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Write an `INT64 x` + `DOUBLE y` file, one row group per entry of `row_groups`.
    fn write_two_column_parquet(
        path: &Path,
        root: &str,
        row_groups: &[usize],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let x = Type::primitive_type_builder("x", PhysicalType::INT64)
            .with_repetition(Repetition::REQUIRED)
            .build()?;
        let y = Type::primitive_type_builder("y", PhysicalType::DOUBLE)
            .with_repetition(Repetition::REQUIRED)
            .build()?;
        let schema = Arc::new(
            Type::group_type_builder(root)
                .with_fields(vec![Arc::new(x), Arc::new(y)])
                .build()?,
        );

        let file = File::create(path)?;
        let props = WriterProperties::builder().build();
        let mut writer = SerializedFileWriter::new(file, schema, Arc::new(props))?;

        let mut next = 0i64;
        for &rows in row_groups {
            let xs: Vec<i64> = (next..next + rows as i64).collect();
            let ys: Vec<f64> = xs.iter().map(|v| *v as f64 * 0.5).collect();
            next += rows as i64;

            let mut rg = writer.next_row_group()?;
            while let Some(mut col) = rg.next_column()? {
                match col.untyped() {
                    ColumnWriter::Int64ColumnWriter(w) => {
                        w.write_batch(&xs, None, None)?;
                    }
                    ColumnWriter::DoubleColumnWriter(w) => {
                        w.write_batch(&ys, None, None)?;
                    }
                    _ => return Err("unexpected column writer".into()),
                }
                col.close()?;
            }
            rg.close()?;
        }
        writer.close()?;
        Ok(())
    }

    #[test]
    fn row_groups_become_baskets() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("events.parquet");
        write_two_column_parquet(&path, "Events", &[30, 50, 20])?;

        let layout = ParquetTreeReader.read_tree(&path, "Events")?;
        assert_eq!(layout.num_entries, 100);
        assert_eq!(layout.branches.len(), 2);

        let x = &layout.branches[0];
        assert_eq!(x.name, "x");
        assert_eq!(x.basket_entry, vec![30, 80, 100]);
        assert_eq!(x.num_baskets(), 3);
        assert_eq!(x.interpretation.typename, "int64");

        let file_len = std::fs::metadata(&path)?.len();
        for branch in &layout.branches {
            for (seek, bytes) in branch.basket_seek.iter().zip(&branch.basket_bytes) {
                assert!(*seek >= 4, "chunk overlaps the PAR1 magic");
                assert!(*bytes > 0);
                assert!(seek + bytes <= file_len);
            }
        }
        assert_eq!(layout.branches[1].interpretation.typename, "float64");
        Ok(())
    }

    #[test]
    fn identical_columns_share_a_cache_key_and_different_types_do_not() -> TestResult {
        let tmp = TempDir::new()?;
        let a = tmp.path().join("a.parquet");
        let b = tmp.path().join("b.parquet");
        write_two_column_parquet(&a, "Events", &[5])?;
        write_two_column_parquet(&b, "Events", &[7, 7])?;

        let la = ParquetTreeReader.read_tree(&a, "Events")?;
        let lb = ParquetTreeReader.read_tree(&b, "Events")?;
        assert!(la.branches[0].interpretation.same_rule(&lb.branches[0].interpretation));
        assert!(!la.branches[0].interpretation.same_rule(&la.branches[1].interpretation));
        Ok(())
    }

    #[test]
    fn wrong_tree_name_is_reported() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("events.parquet");
        write_two_column_parquet(&path, "Events", &[3])?;

        let err = ParquetTreeReader
            .read_tree(&path, "Runs")
            .expect_err("expected TreeNotFound");
        assert!(matches!(err, TreeReadError::TreeNotFound { ref found, .. } if found == "Events"));
        Ok(())
    }

    #[test]
    fn missing_and_garbage_files_are_reported() -> TestResult {
        let tmp = TempDir::new()?;
        let err = ParquetTreeReader
            .read_tree(&tmp.path().join("nope.parquet"), "Events")
            .expect_err("expected Open");
        assert!(matches!(err, TreeReadError::Open { .. }));

        let garbage = tmp.path().join("garbage.parquet");
        std::fs::write(&garbage, b"definitely not parquet")?;
        let err = ParquetTreeReader
            .read_tree(&garbage, "Events")
            .expect_err("expected Decode");
        assert!(matches!(err, TreeReadError::Decode { .. }));
        assert!(err.to_string().contains("garbage.parquet"));
        Ok(())
    }

    #[test]
    fn typename_prefers_logical_annotations() {
        assert_eq!(
            typename(PhysicalType::BYTE_ARRAY, Some(&LogicalType::String), None, false),
            "string"
        );
        assert_eq!(
            typename(
                PhysicalType::INT64,
                Some(&LogicalType::Timestamp {
                    is_adjusted_to_u_t_c: true,
                    unit: TimeUnit::MICROS,
                }),
                None,
                false
            ),
            "timestamp[us]"
        );
        assert_eq!(
            typename(PhysicalType::FIXED_LEN_BYTE_ARRAY, None, Some(16), false),
            "bytes[16]"
        );
        assert_eq!(typename(PhysicalType::FLOAT, None, None, true), "float32[]");
    }
}
