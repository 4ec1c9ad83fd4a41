use std::{error::Error, fs::File, io::Write};

use csv::Writer;
use serde::Serialize;

use crate::dispatcher::{CandidateResult, CandidateStatus, Resource};

#[derive(Serialize)]
struct RankingRow<'a> {
    rank: usize,
    resource: String,
    name: String,
    status: &'a str,
    ferry_from: String,
    score: u32,
    connecting_leg: Option<u64>,
    annotation: String,
    description: String,
}

/// Writes a ranking to `<filename_prefix>-ranking.csv`.
pub fn export_ranking<R: Resource>(
    ranking: &[CandidateResult<R>],
    filename_prefix: &str,
) -> Result<(), Box<dyn Error>> {
    let mut writer: Writer<File> = Writer::from_path(format!("{}-ranking.csv", filename_prefix))?;
    write_ranking(ranking, &mut writer)
}

/// One CSV row per candidate, best first, with a header row.
pub fn write_ranking<R: Resource, W: Write>(
    ranking: &[CandidateResult<R>],
    writer: &mut Writer<W>,
) -> Result<(), Box<dyn Error>> {
    for (position, candidate) in ranking.iter().enumerate() {
        let (status, ferry_from) = match candidate.status {
            CandidateStatus::Local => ("local", String::new()),
            CandidateStatus::Ferry { from } => ("ferry", from.to_string()),
        };
        writer.serialize(RankingRow {
            rank: position + 1,
            resource: candidate.resource.resource_id().to_string(),
            name: candidate.resource.display_name(),
            status,
            ferry_from,
            score: candidate.score,
            connecting_leg: candidate.connecting_leg,
            annotation: candidate
                .annotation
                .map(|a| a.to_string())
                .unwrap_or_default(),
            description: candidate.describe(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aircraft::{Aircraft, AircraftSize},
        dispatcher::Annotation,
    };

    #[test]
    fn writes_header_and_rows_in_rank_order() {
        let ranking = vec![
            CandidateResult {
                resource: Aircraft::new(4, "Airbus", AircraftSize::Small),
                status: CandidateStatus::Local,
                score: 0,
                ferry_needed: false,
                connecting_leg: None,
                annotation: None,
            },
            CandidateResult {
                resource: Aircraft::new(2, "Boeing", AircraftSize::Big),
                status: CandidateStatus::Ferry {
                    from: "LHR".parse().unwrap(),
                },
                score: 15,
                ferry_needed: true,
                connecting_leg: Some(31),
                annotation: Some(Annotation::InefficientSize),
            },
        ];
        let mut writer = Writer::from_writer(Vec::new());
        write_ranking(&ranking, &mut writer).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "rank,resource,name,status,ferry_from,score,connecting_leg,annotation,description"
        );
        assert_eq!(
            lines[1],
            "1,aircraft 4,Airbus #4 (Small),local,,0,,,Available Locally"
        );
        assert_eq!(
            lines[2],
            "2,aircraft 2,Boeing #2 (Big),ferry,LHR,15,31,Inefficient Size,Requires Ferry from LHR (Inefficient Size)"
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn exports_to_prefixed_file() {
        let prefix = std::env::temp_dir().join(format!("assign-export-{}", std::process::id()));
        let prefix = prefix.to_string_lossy().into_owned();
        let ranking = vec![CandidateResult {
            resource: Aircraft::new(1, "Embraer", AircraftSize::Small),
            status: CandidateStatus::Local,
            score: 0,
            ferry_needed: false,
            connecting_leg: None,
            annotation: None,
        }];
        export_ranking(&ranking, &prefix).unwrap();

        let path = format!("{}-ranking.csv", prefix);
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("Embraer #1 (Small)"));
    }
}
