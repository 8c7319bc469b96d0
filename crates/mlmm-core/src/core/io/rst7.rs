use super::prmtop::AmberError;
use super::traits::InputFile;
use crate::core::units::{AMBER_VELOCITY_FACTOR, ANGSTROM_TO_NM};
use nalgebra::{Point3, Vector3};
use std::io::BufRead;

const FIELD_WIDTH: usize = 12;

/// Coordinates (and optionally velocities and box) from an AMBER ASCII restart file.
#[derive(Debug, Clone, PartialEq)]
pub struct AmberCoordinates {
    pub title: String,
    /// Simulation time in ps, if the file records one.
    pub time: Option<f64>,
    /// Positions in nm.
    pub positions: Vec<Point3<f64>>,
    /// Velocities in nm/ps.
    pub velocities: Option<Vec<Vector3<f64>>>,
    /// Rectangular box edges in nm.
    pub periodic_box: Option<Vector3<f64>>,
}

/// Reader for ASCII `.rst7`, `.inpcrd` and `.crd` files.
pub struct Rst7File;

impl InputFile for Rst7File {
    type Output = AmberCoordinates;
    type Error = AmberError;

    fn read_from(reader: &mut impl BufRead) -> Result<AmberCoordinates, AmberError> {
        let mut lines = reader.lines();

        let title = lines
            .next()
            .transpose()?
            .ok_or_else(|| AmberError::UnsupportedFormat("empty coordinate file".to_string()))?;
        if title.starts_with("CDF") || title.starts_with("\u{89}HDF") {
            return Err(AmberError::UnsupportedFormat(
                "NetCDF restart files are not supported; convert to ASCII rst7".to_string(),
            ));
        }

        let header = lines.next().transpose()?.ok_or_else(|| {
            AmberError::UnsupportedFormat("coordinate file has no atom count line".to_string())
        })?;
        let mut header_fields = header.split_whitespace();
        let natom: usize = header_fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| AmberError::InvalidValue {
                section: "atom count".to_string(),
                value: header.trim().to_string(),
            })?;
        let time = header_fields.next().and_then(|f| f.parse::<f64>().ok());

        let mut values: Vec<Vec<f64>> = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            values.push(parse_fixed_line(&line)?);
        }

        let needed = 3 * natom;
        let mut flat: Vec<f64> = Vec::with_capacity(needed);
        let mut rows = values.into_iter();
        while flat.len() < needed {
            match rows.next() {
                Some(row) => flat.extend(row),
                None => {
                    return Err(AmberError::Count {
                        section: "coordinates".to_string(),
                        expected: needed,
                        actual: flat.len(),
                    });
                }
            }
        }
        let remaining: Vec<Vec<f64>> = rows.collect();
        let remaining_count: usize = remaining.iter().map(Vec::len).sum();

        let positions = to_points(&flat[..needed]);
        let (velocities, box_row) = if remaining_count >= needed && needed > 0 {
            let mut vel: Vec<f64> = Vec::with_capacity(needed);
            let mut rest = remaining.into_iter();
            while vel.len() < needed {
                match rest.next() {
                    Some(row) => vel.extend(row),
                    None => break,
                }
            }
            let velocities = to_points(&vel[..needed])
                .into_iter()
                .map(|p| p.coords * AMBER_VELOCITY_FACTOR)
                .collect::<Vec<_>>();
            (Some(velocities), rest.next())
        } else {
            (None, remaining.into_iter().next())
        };

        let periodic_box = match box_row {
            Some(row) if row.len() >= 3 => {
                if row.len() >= 6 {
                    let angles = [row[3], row[4], row[5]];
                    if angles.iter().any(|a| (a - 90.0).abs() > 1e-3) {
                        return Err(AmberError::UnsupportedBox(angles));
                    }
                }
                Some(Vector3::new(row[0], row[1], row[2]) * ANGSTROM_TO_NM)
            }
            Some(row) => {
                return Err(AmberError::InvalidValue {
                    section: "box".to_string(),
                    value: format!("{row:?}"),
                });
            }
            None => None,
        };

        Ok(AmberCoordinates {
            title: title.trim().to_string(),
            time,
            positions,
            velocities,
            periodic_box,
        })
    }
}

/// Converts Å triples into nm points.
fn to_points(values: &[f64]) -> Vec<Point3<f64>> {
    values
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]) * ANGSTROM_TO_NM)
        .collect()
}

fn parse_fixed_line(line: &str) -> Result<Vec<f64>, AmberError> {
    let line = line.trim_end();
    let mut values = Vec::with_capacity(6);
    let mut start = 0;
    while start < line.len() {
        let end = (start + FIELD_WIDTH).min(line.len());
        let field = line.get(start..end).unwrap_or("").trim();
        if !field.is_empty() {
            let value = field.parse::<f64>().map_err(|_| AmberError::InvalidValue {
                section: "coordinates".to_string(),
                value: field.to_string(),
            })?;
            values.push(value);
        }
        start = end;
    }
    Ok(values)
}
