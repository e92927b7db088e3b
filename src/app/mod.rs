mod input;
mod output;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::bounded;
use rayon::prelude::*;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use osmroute::Mapping;
use osmroute::element::{MemberType, Tags};
use osmroute::geometry::SourceGeometry;
use osmroute::mapping::{ElementClass, TagFilterer};
use osmroute::utils::ClassifyProgress;

use input::{Parsed, parse_line};
use output::{OutputRow, RowSink};

/// Lines classified together; output order is kept within and across batches.
const BATCH_SIZE: usize = 1024;

const PROGRESS_INTERVAL: u64 = 100_000;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Mapping document (YAML)
    #[arg(short, long)]
    pub mapping: PathBuf,

    /// Elements as JSON lines ('-' for stdin); without it the mapping is only checked
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output file for classified rows ('-' for stdout)
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,

    /// Runtime settings file (YAML); OSMROUTE_* variables override it
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Number of threads (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Classify elements with all their tags
    #[arg(long)]
    pub no_filter_tags: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Log what the mapping compiled into, per element class.
pub fn summarize_mapping(mapping: &Mapping) {
    tracing::info!("Mapping: {} tables", mapping.config().tables.len());
    for class in ElementClass::ALL {
        let matcher = mapping.matcher(class);
        let tables: Vec<String> = matcher.destinations().map(|d| d.to_string()).collect();
        tracing::info!(
            "Mapping: {} -> {}",
            class.as_str(),
            if tables.is_empty() {
                "-".to_string()
            } else {
                tables.join(", ")
            }
        );
    }
}

pub fn init_sink(output: &Path) -> Result<RowSink> {
    if output == Path::new("-") {
        tracing::info!("Sink: stdout");
        RowSink::stdout()
    } else {
        tracing::info!("Sink: {:?}", output);
        RowSink::new(output).with_context(|| format!("Output: Failed to create {:?}", output))
    }
}

fn open_input(input: &Path) -> Result<Box<dyn BufRead + Send>> {
    if input == Path::new("-") {
        Ok(Box::new(BufReader::new(std::io::stdin())))
    } else {
        let file = std::fs::File::open(input)
            .with_context(|| format!("Input: Failed to open {:?}", input))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Classify a JSON lines element stream and write one output line per row.
///
/// Lines are read in batches on a reader thread; each batch is classified in
/// parallel and written in input order.
pub fn process_input(
    mapping: &Mapping,
    input: &Path,
    sink: &mut RowSink,
    filter_tags: bool,
) -> Result<u64> {
    let reader = open_input(input)?;
    let (tx, rx) = bounded::<Vec<(usize, String)>>(4);
    let progress = ClassifyProgress::new(PROGRESS_INTERVAL);

    let reader_thread = std::thread::spawn(move || -> Result<()> {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        for (index, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Input: Failed reading line {}", index + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            batch.push((index + 1, line));
            if batch.len() == BATCH_SIZE {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
                if tx.send(full).is_err() {
                    // classifier stopped early; its error is reported instead
                    return Ok(());
                }
            }
        }
        if !batch.is_empty() {
            let _ = tx.send(batch);
        }
        Ok(())
    });

    let classify_result = rx.iter().try_for_each(|batch| -> Result<()> {
        let rows = batch
            .par_iter()
            .map(|(line_no, line)| {
                classify_line(mapping, line, filter_tags)
                    .with_context(|| format!("Input: line {}", line_no))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut written = 0u64;
        for row in rows.iter().flatten() {
            sink.add_row(row)?;
            written += 1;
        }
        progress.record(batch.len() as u64, written);
        Ok(())
    });
    drop(rx);

    let reader_result = reader_thread
        .join()
        .map_err(|_| anyhow!("Input: Reader thread panicked"))?;
    classify_result?;
    reader_result?;

    progress.finish();
    Ok(sink.written())
}

fn filter(filter: &impl TagFilterer, tags: &mut Tags, enabled: bool) {
    if enabled {
        filter.filter(tags);
    }
}

/// All rows produced by one element.
pub fn classify_line(mapping: &Mapping, line: &str, filter_tags: bool) -> Result<Vec<OutputRow>> {
    let mut rows = Vec::new();
    match parse_line(line)? {
        Parsed::Node(mut node, geometry) => {
            filter(mapping.node_tag_filter(), &mut node.element.tags, filter_tags);
            let geometry = geometry.as_ref();
            for matched in mapping.point_matcher().match_node(&node) {
                let row = matched.row(&node.element, geometry);
                rows.push(OutputRow::new(
                    ElementClass::Point,
                    node.element.id,
                    None,
                    &matched,
                    row,
                ));
            }
        }
        Parsed::Way(mut way, geometry) => {
            filter(mapping.way_tag_filter(), &mut way.element.tags, filter_tags);
            let geometry = geometry.as_ref();
            for class in [ElementClass::LineString, ElementClass::Polygon] {
                for matched in mapping.matcher(class).match_way(&way) {
                    let row = matched.row(&way.element, geometry);
                    rows.push(OutputRow::new(class, way.element.id, None, &matched, row));
                }
            }
        }
        Parsed::Relation(mut relation, geometry) => {
            filter(
                mapping.relation_tag_filter(),
                &mut relation.element.tags,
                filter_tags,
            );
            for member in &mut relation.members {
                let member_filter = match member.member_type {
                    MemberType::Node => mapping.node_tag_filter(),
                    MemberType::Way => mapping.way_tag_filter(),
                    MemberType::Relation => mapping.relation_tag_filter(),
                };
                if filter_tags {
                    member_filter.filter_opt(member.element.as_mut().map(|e| &mut e.tags));
                }
            }
            let geometry: Option<&SourceGeometry> = geometry.as_ref();
            for class in [ElementClass::Polygon, ElementClass::Relation] {
                for matched in mapping.matcher(class).match_relation(&relation) {
                    let row = matched.row(&relation.element, geometry);
                    rows.push(OutputRow::new(class, relation.element.id, None, &matched, row));
                }
            }
            for matched in mapping.relation_member_matcher().match_relation(&relation) {
                for (index, member) in relation.members.iter().enumerate() {
                    let row = matched.member_row(&relation, member, index, geometry);
                    rows.push(OutputRow::new(
                        ElementClass::RelationMember,
                        relation.element.id,
                        Some(index),
                        &matched,
                        row,
                    ));
                }
            }
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmroute::config::MappingConfig;

    fn mapping() -> Mapping {
        Mapping::compile(
            MappingConfig::from_yaml_str(
                r#"
tables:
  roads:
    type: linestring
    mapping: {highway: [__any__]}
    columns:
      - {name: osm_id, type: id}
      - {name: name, type: string, key: name}
  stops:
    type: relation_member
    mapping: {route: [bus]}
    columns:
      - {name: member, type: member_id}
"#,
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn classifies_ways_with_filtered_tags() {
        let rows = classify_line(
            &mapping(),
            r#"{"type":"way","id":4,"refs":[1,2],"tags":{"highway":"primary","name":"A","fixme":"x"}}"#,
            true,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].table, "roads");
        assert_eq!(rows[0].row["osm_id"], 4);
        assert_eq!(rows[0].row["name"], "A");
    }

    #[test]
    fn row_objects_follow_column_order() {
        let mapping = Mapping::compile(
            MappingConfig::from_yaml_str(
                r#"
tables:
  pois:
    type: point
    mapping: {amenity: [cafe]}
    columns:
      - {name: osm_id, type: id}
      - {name: name, type: string, key: name}
      - {name: amenity, type: mapping_value}
"#,
            )
            .unwrap(),
        )
        .unwrap();
        let rows = classify_line(
            &mapping,
            r#"{"type":"node","id":1,"tags":{"amenity":"cafe","name":"X"}}"#,
            true,
        )
        .unwrap();
        let json = serde_json::to_string(&rows[0].row).unwrap();
        assert_eq!(json, r#"{"osm_id":1,"name":"X","amenity":"cafe"}"#);
    }

    #[test]
    fn relation_members_get_one_row_each() {
        let rows = classify_line(
            &mapping(),
            r#"{"type":"relation","id":8,"tags":{"route":"bus"},
                "members":[{"type":"node","ref":1},{"type":"node","ref":2}]}"#,
            true,
        )
        .unwrap();
        let members: Vec<_> = rows
            .iter()
            .map(|r| (r.member_index, r.row["member"].clone()))
            .collect();
        assert_eq!(
            members,
            vec![(Some(0), serde_json::json!(1)), (Some(1), serde_json::json!(2))]
        );
    }
}
