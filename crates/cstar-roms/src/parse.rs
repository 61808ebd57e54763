//! Parse (§4.K), grounded in `read_inp.py`'s `ROMSRuntimeSettings.from_file`:
//! scan the file into `section name -> value lines`, then interpret each
//! known section per its schema.

use crate::runtime_settings::{
    BottomDrag, Initial, LinRhoEos, MarblBiogeochemistry, MyBakMixing, ROMSRuntimeSettings,
    SCoord, TimeStepping, VerticalMixing, DEFAULT_OUTPUT_ROOT_NAME,
};
use cstar_core::error::CStarError;
use cstar_core::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

type Sections = HashMap<String, Vec<String>>;

/// Splits a `.in` file's lines into section name -> (trimmed, non-comment)
/// value lines. A line containing `:` starts a new section named by the
/// text before the colon; everything up to the next such line (or EOF)
/// belongs to it. Lines starting with `!` are comments and are dropped.
fn scan_sections(content: &str) -> Sections {
    let lines: Vec<&str> = content.lines().collect();
    let mut sections = Sections::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        if line.is_empty() || line.starts_with('!') {
            i += 1;
            continue;
        }

        if let Some(colon) = line.find(':') {
            let section_name = line[..colon].trim().to_string();
            i += 1;
            let mut section_lines = Vec::new();

            while i < lines.len() && !lines[i].contains(':') {
                let value_line = lines[i].trim();
                if !value_line.is_empty() && !value_line.starts_with('!') {
                    section_lines.push(value_line.to_string());
                }
                i += 1;
            }

            sections.insert(section_name, section_lines);
        } else {
            i += 1;
        }
    }

    sections
}

fn missing(name: &str) -> CStarError {
    CStarError::Validation(format!("ROMS .in file is missing required section '{name}'"))
}

fn section_tokens<'a>(sections: &'a Sections, name: &str) -> Option<Vec<&'a str>> {
    sections
        .get(name)
        .and_then(|lines| lines.first())
        .map(|line| line.split_whitespace().collect())
}

fn parse_ints(sections: &Sections, name: &str) -> Result<Option<Vec<i64>>> {
    let Some(tokens) = section_tokens(sections, name) else {
        return Ok(None);
    };
    let values = tokens
        .iter()
        .map(|t| {
            t.parse::<i64>().map_err(|e| {
                CStarError::Validation(format!("section '{name}' has a non-integer value '{t}': {e}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(values))
}

/// D-exponent normalisation (§4.K): `1.0D-3` -> `1.0E-3`, Fortran's
/// alternate scientific-notation marker.
fn normalise_float_token(token: &str) -> String {
    token.replace(['D', 'd'], "E")
}

fn parse_floats(sections: &Sections, name: &str) -> Result<Option<Vec<f64>>> {
    let Some(tokens) = section_tokens(sections, name) else {
        return Ok(None);
    };
    let values = tokens
        .iter()
        .map(|t| {
            normalise_float_token(t).parse::<f64>().map_err(|e| {
                CStarError::Validation(format!("section '{name}' has a non-numeric value '{t}': {e}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(values))
}

fn parse_float_scalar(sections: &Sections, name: &str) -> Result<Option<f64>> {
    Ok(parse_floats(sections, name)?.and_then(|v| v.into_iter().next()))
}

fn parse_path_scalar(sections: &Sections, name: &str) -> Option<PathBuf> {
    section_tokens(sections, name)
        .and_then(|tokens| tokens.first().map(|t| PathBuf::from(*t)))
}

/// Entry point for a file on disk. Mirrors `ROMSRuntimeSettings.from_file`.
pub fn from_file(path: impl AsRef<Path>) -> Result<ROMSRuntimeSettings> {
    let content = fs_err::read_to_string(path.as_ref())?;
    parse(&content)
}

/// Entry point for in-memory content. The separation from [`from_file`]
/// exists so callers (and tests) can parse already-staged text without a
/// round trip through the filesystem.
pub fn parse(content: &str) -> Result<ROMSRuntimeSettings> {
    let sections = scan_sections(content);

    let title = sections
        .get("title")
        .and_then(|lines| lines.first())
        .ok_or_else(|| missing("title"))?
        .clone();

    let ts = parse_ints(&sections, "time_stepping")?.ok_or_else(|| missing("time_stepping"))?;
    if ts.len() < 4 {
        return Err(CStarError::Validation(
            "section 'time_stepping' requires 4 values: ntimes dt ndtfast ninfo".to_string(),
        ));
    }
    let time_stepping = TimeStepping {
        ntimes: ts[0],
        dt: ts[1],
        ndtfast: ts[2],
        ninfo: ts[3],
    };

    let bd = parse_floats(&sections, "bottom_drag")?.ok_or_else(|| missing("bottom_drag"))?;
    if bd.len() < 3 {
        return Err(CStarError::Validation(
            "section 'bottom_drag' requires 3 values: rdrg rdrg2 zob".to_string(),
        ));
    }
    let bottom_drag = BottomDrag {
        rdrg: bd[0],
        rdrg2: bd[1],
        zob: bd[2],
    };

    let initial_lines = sections.get("initial").ok_or_else(|| missing("initial"))?;
    let nrrec = initial_lines
        .first()
        .ok_or_else(|| missing("initial"))?
        .parse::<i64>()
        .map_err(|e| CStarError::Validation(format!("'initial' section's nrrec is not an integer: {e}")))?;
    let ininame = initial_lines.get(1).map(PathBuf::from);
    let initial = Initial { nrrec, ininame };

    let forcing = sections
        .get("forcing")
        .ok_or_else(|| missing("forcing"))?
        .iter()
        .map(PathBuf::from)
        .collect();

    // §4.K "Fixed output name": whatever the file says is discarded in
    // favour of the canonical value.
    if !sections.contains_key("output_root_name") {
        return Err(missing("output_root_name"));
    }
    let output_root_name = DEFAULT_OUTPUT_ROOT_NAME.to_string();

    let mut settings =
        ROMSRuntimeSettings::new(title, time_stepping, bottom_drag, initial, forcing, output_root_name);

    if let Some(sc) = parse_floats(&sections, "S-coord")? {
        if sc.len() < 3 {
            return Err(CStarError::Validation(
                "section 'S-coord' requires 3 values: theta_s theta_b tcline".to_string(),
            ));
        }
        settings = settings.s_coord(SCoord {
            theta_s: sc[0],
            theta_b: sc[1],
            tcline: sc[2],
        });
    }

    if let Some(rho0) = parse_float_scalar(&sections, "rho0")? {
        settings = settings.rho0(rho0);
    }

    if let Some(eos) = parse_floats(&sections, "lin_rho_eos")? {
        if eos.len() < 4 {
            return Err(CStarError::Validation(
                "section 'lin_rho_eos' requires 4 values: Tcoef T0 Scoef S0".to_string(),
            ));
        }
        settings = settings.lin_rho_eos(LinRhoEos {
            tcoef: eos[0],
            t0: eos[1],
            scoef: eos[2],
            s0: eos[3],
        });
    }

    if let Some(lines) = sections.get("MARBL_biogeochemistry") {
        if lines.len() < 3 {
            return Err(CStarError::Validation(
                "section 'MARBL_biogeochemistry' requires 3 values: namelist, tracer list, \
                 diag list file names"
                    .to_string(),
            ));
        }
        settings = settings.marbl_biogeochemistry(MarblBiogeochemistry {
            marbl_namelist_fname: PathBuf::from(&lines[0]),
            marbl_tracer_list_fname: PathBuf::from(&lines[1]),
            marbl_diag_list_fname: PathBuf::from(&lines[2]),
        });
    }

    if let Some(v) = parse_float_scalar(&sections, "lateral_visc")? {
        settings = settings.lateral_visc(v);
    }

    if let Some(v) = parse_float_scalar(&sections, "gamma2")? {
        settings = settings.gamma2(v);
    }

    if let Some(v) = parse_floats(&sections, "tracer_diff2")? {
        settings = settings.tracer_diff2(v);
    }

    if let Some(vm) = parse_floats(&sections, "vertical_mixing")? {
        if vm.is_empty() {
            return Err(CStarError::Validation(
                "section 'vertical_mixing' requires at least 1 value: Akv_bak [Akt_bak ...]"
                    .to_string(),
            ));
        }
        settings = settings.vertical_mixing(VerticalMixing {
            akv_bak: vm[0],
            akt_bak: vm[1..].to_vec(),
        });
    }

    if let Some(my) = parse_floats(&sections, "MY_bak_mixing")? {
        if my.len() < 3 {
            return Err(CStarError::Validation(
                "section 'MY_bak_mixing' requires 3 values: Akq_bak q2nu2 q2nu4".to_string(),
            ));
        }
        settings = settings.my_bak_mixing(MyBakMixing {
            akq_bak: my[0],
            q2nu2: my[1],
            q2nu4: my[2],
        });
    }

    if let Some(v) = parse_float_scalar(&sections, "SSS_correction")? {
        settings = settings.sss_correction(v);
    }

    if let Some(v) = parse_float_scalar(&sections, "SST_correction")? {
        settings = settings.sst_correction(v);
    }

    if let Some(v) = parse_float_scalar(&sections, "ubind")? {
        settings = settings.ubind(v);
    }

    if let Some(v) = parse_float_scalar(&sections, "v_sponge")? {
        settings = settings.v_sponge(v);
    }

    if let Some(grid) = parse_path_scalar(&sections, "grid") {
        settings = settings.grid(grid);
    }

    if let Some(climatology) = parse_path_scalar(&sections, "climatology") {
        settings = settings.climatology(climatology);
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
title:
    a test run
time_stepping: ntimes dt ndtfast ninfo
    360 60 60 1
bottom_drag: rdrg rdrg2 zob
    0.0D+00 1.0D-03 1.0D-02
initial: nrrec ininame
    1
    input_datasets/roms_ini.nc
forcing:
    input_datasets/roms_frc.nc
    input_datasets/roms_bry.nc
output_root_name:
    whatever_the_file_says
";

    #[test]
    fn parses_required_sections() {
        let settings = parse(MINIMAL).unwrap();
        assert_eq!(settings.title, "a test run");
        assert_eq!(
            settings.time_stepping,
            TimeStepping { ntimes: 360, dt: 60, ndtfast: 60, ninfo: 1 }
        );
        assert_eq!(settings.bottom_drag.rdrg, 0.0);
        assert_eq!(settings.bottom_drag.rdrg2, 1.0e-3);
        assert_eq!(settings.bottom_drag.zob, 1.0e-2);
        assert_eq!(settings.initial.nrrec, 1);
        assert_eq!(
            settings.initial.ininame,
            Some(PathBuf::from("input_datasets/roms_ini.nc"))
        );
        assert_eq!(settings.forcing.len(), 2);
    }

    #[test]
    fn output_root_name_is_always_fixed() {
        let settings = parse(MINIMAL).unwrap();
        assert_eq!(settings.output_root_name, DEFAULT_OUTPUT_ROOT_NAME);
    }

    #[test]
    fn missing_required_section_fails() {
        let broken = MINIMAL.replace("title:", "unrelated_section:");
        assert!(parse(&broken).is_err());
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let content = format!("! a header comment\n\n{MINIMAL}\n! trailing comment\n");
        let settings = parse(&content).unwrap();
        assert_eq!(settings.title, "a test run");
    }

    #[test]
    fn d_exponent_is_normalised_to_e() {
        let content = MINIMAL.replace("0.0D+00 1.0D-03 1.0D-02", "0.0d+00 1.0D-03 1.0d-02");
        let settings = parse(&content).unwrap();
        assert_eq!(settings.bottom_drag.rdrg2, 1.0e-3);
    }

    #[test]
    fn truncated_optional_sections_are_fatal_not_silently_dropped() {
        let cases = [
            ("S-coord:\n    5.0 0.4\n", "S-coord"),
            ("lin_rho_eos:\n    1.7 0.0 0.0\n", "lin_rho_eos"),
            ("MARBL_biogeochemistry:\n    marbl_in\n    tracer.nml\n", "MARBL_biogeochemistry"),
            ("MY_bak_mixing:\n    1.0 2.0\n", "MY_bak_mixing"),
        ];
        for (section, name) in cases {
            let content = format!("{MINIMAL}\n{section}");
            let err = parse(&content).unwrap_err();
            assert!(
                matches!(err, CStarError::Validation(ref msg) if msg.contains(name)),
                "expected a Validation error naming '{name}', got {err:?}"
            );
        }
    }
}
