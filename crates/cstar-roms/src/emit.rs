//! Emit (§4.K), grounded in `read_inp.py`'s `ROMSRuntimeSettings.to_file`:
//! write each populated field as a section, using ROMS's fixed-column
//! float formatting.

use crate::runtime_settings::ROMSRuntimeSettings;
use cstar_core::Result;
use std::io::Write;
use std::path::Path;

/// Formats a single float using ROMS conventions: `0.0` is always `"0."`;
/// values outside `[1e-2, 1e4)` in magnitude use 6-digit scientific
/// notation with the `E+00` exponent suffix collapsed to `E0`; everything
/// else uses its natural decimal form.
fn format_float(val: f64) -> String {
    if val == 0.0 {
        "0.".to_string()
    } else if val.abs() < 1e-2 || val.abs() >= 1e4 {
        format!("{val:.6E}").replace("E+00", "E0")
    } else {
        format_plain_float(val)
    }
}

/// Rust's `{}` formatting of a float drops the trailing `.` for whole
/// numbers (`1.0` -> `"1"`); Python's `str(float)` keeps it. ROMS `.in`
/// files are read by Fortran free-format I/O, which accepts either, but
/// matching the original's output byte-for-byte keeps the round-trip
/// faithful to the reference fixture.
fn format_plain_float(val: f64) -> String {
    let s = val.to_string();
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{s}.")
    }
}

fn format_float_list(values: &[f64]) -> String {
    values.iter().map(|v| format_float(*v)).collect::<Vec<_>>().join(" ")
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

/// Writes an inline-keyed section (`name: key1 key2 ...` followed by an
/// indented, `joiner`-separated value line). Matches `write_section`'s
/// `OrderedDict` branch in the original, where `joiner` is `"    "` for a
/// single-line section and `"\n    "` for a multi-line one.
fn write_inline_section_joined(
    out: &mut impl Write,
    name: &str,
    keys: &[&str],
    values: &[String],
    joiner: &str,
) -> Result<()> {
    writeln!(out, "{name}: {}", keys.join(" "))?;
    writeln!(out, "    {}", values.join(joiner))?;
    writeln!(out)?;
    Ok(())
}

fn write_inline_section(
    out: &mut impl Write,
    name: &str,
    keys: &[&str],
    values: &[String],
) -> Result<()> {
    write_inline_section_joined(out, name, keys, values, "    ")
}

fn write_multiline_section(out: &mut impl Write, name: &str, values: &[String]) -> Result<()> {
    writeln!(out, "{name}:")?;
    writeln!(out, "    {}", values.join("\n    "))?;
    writeln!(out)?;
    Ok(())
}

fn write_single_value_section(out: &mut impl Write, name: &str, value: &str) -> Result<()> {
    writeln!(out, "{name}:")?;
    writeln!(out, "    {value}")?;
    writeln!(out)?;
    Ok(())
}

/// Entry point for a file on disk. Mirrors `ROMSRuntimeSettings.to_file`.
pub fn to_file(settings: &ROMSRuntimeSettings, path: impl AsRef<Path>) -> Result<()> {
    let mut out = fs_err::File::create(path.as_ref())?;
    emit(settings, &mut out)
}

/// Writes `settings` in `.in` format to `out`. Section order matches the
/// original: the six non-optional sections first, then every populated
/// optional section in declaration order.
pub fn emit(settings: &ROMSRuntimeSettings, out: &mut impl Write) -> Result<()> {
    write_single_value_section(out, "title", &settings.title)?;

    write_inline_section(
        out,
        "time_stepping",
        &["ntimes", "dt", "ndtfast", "ninfo"],
        &[
            settings.time_stepping.ntimes.to_string(),
            settings.time_stepping.dt.to_string(),
            settings.time_stepping.ndtfast.to_string(),
            settings.time_stepping.ninfo.to_string(),
        ],
    )?;

    write_inline_section(
        out,
        "bottom_drag",
        &["rdrg", "rdrg2", "zob"],
        &[
            format_float(settings.bottom_drag.rdrg),
            format_float(settings.bottom_drag.rdrg2),
            format_float(settings.bottom_drag.zob),
        ],
    )?;

    let ininame = settings
        .initial
        .ininame
        .as_ref()
        .map(|p| path_str(p))
        .unwrap_or_default();
    write_inline_section_joined(
        out,
        "initial",
        &["nrrec", "ininame"],
        &[settings.initial.nrrec.to_string(), ininame],
        "\n    ",
    )?;

    let forcing: Vec<String> = settings.forcing.iter().map(|p| path_str(p)).collect();
    write_multiline_section(out, "forcing", &forcing)?;

    write_single_value_section(out, "output_root_name", &settings.output_root_name)?;

    if let Some(s_coord) = &settings.s_coord {
        write_inline_section(
            out,
            "S-coord",
            &["theta_s", "theta_b", "tcline"],
            &[
                format_float(s_coord.theta_s),
                format_float(s_coord.theta_b),
                format_float(s_coord.tcline),
            ],
        )?;
    }

    if let Some(grid) = &settings.grid {
        write_single_value_section(out, "grid", &path_str(grid))?;
    }

    if let Some(marbl) = &settings.marbl_biogeochemistry {
        write_multiline_section(
            out,
            "MARBL_biogeochemistry",
            &[
                path_str(&marbl.marbl_namelist_fname),
                path_str(&marbl.marbl_tracer_list_fname),
                path_str(&marbl.marbl_diag_list_fname),
            ],
        )?;
    }

    if let Some(v) = settings.lateral_visc {
        write_single_value_section(out, "lateral_visc", &format_float(v))?;
    }

    if let Some(v) = settings.rho0 {
        write_single_value_section(out, "rho0", &format_float(v))?;
    }

    if let Some(eos) = &settings.lin_rho_eos {
        write_inline_section(
            out,
            "lin_rho_eos",
            &["Tcoef", "T0", "Scoef", "S0"],
            &[
                format_float(eos.tcoef),
                format_float(eos.t0),
                format_float(eos.scoef),
                format_float(eos.s0),
            ],
        )?;
    }

    if let Some(v) = settings.gamma2 {
        write_single_value_section(out, "gamma2", &format_float(v))?;
    }

    if let Some(values) = &settings.tracer_diff2 {
        write_single_value_section(out, "tracer_diff2", &format_float_list(values))?;
    }

    if let Some(vm) = &settings.vertical_mixing {
        write_inline_section(
            out,
            "vertical_mixing",
            &["Akv_bak", "Akt_bak"],
            &[format_float(vm.akv_bak), format_float_list(&vm.akt_bak)],
        )?;
    }

    if let Some(my) = &settings.my_bak_mixing {
        write_inline_section(
            out,
            "MY_bak_mixing",
            &["Akq_bak", "q2nu2", "q2nu4"],
            &[
                format_float(my.akq_bak),
                format_float(my.q2nu2),
                format_float(my.q2nu4),
            ],
        )?;
    }

    if let Some(v) = settings.sss_correction {
        write_single_value_section(out, "SSS_correction", &format_float(v))?;
    }

    if let Some(v) = settings.sst_correction {
        write_single_value_section(out, "SST_correction", &format_float(v))?;
    }

    if let Some(v) = settings.ubind {
        write_single_value_section(out, "ubind", &format_float(v))?;
    }

    if let Some(v) = settings.v_sponge {
        write_single_value_section(out, "v_sponge", &format_float(v))?;
    }

    if let Some(climatology) = &settings.climatology {
        write_single_value_section(out, "climatology", &path_str(climatology))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_formats_as_dot() {
        assert_eq!(format_float(0.0), "0.");
    }

    #[test]
    fn small_and_large_magnitudes_use_scientific_notation() {
        assert_eq!(format_float(1.0e-3), "1.000000E-3");
        assert_eq!(format_float(1.0e4), "1.000000E4");
    }

    #[test]
    fn mid_range_values_use_plain_form() {
        assert_eq!(format_float(1.0), "1.");
        assert_eq!(format_float(0.5), "0.5");
    }

    #[test]
    fn emit_then_parse_round_trips() {
        use crate::parse::parse;
        use crate::runtime_settings::{BottomDrag, Initial, TimeStepping};
        use std::path::PathBuf;

        let settings = ROMSRuntimeSettings::new(
            "a round trip test",
            TimeStepping { ntimes: 100, dt: 30, ndtfast: 45, ninfo: 1 },
            BottomDrag { rdrg: 0.0, rdrg2: 1.0e-3, zob: 1.0e-2 },
            Initial { nrrec: 1, ininame: Some(PathBuf::from("ini.nc")) },
            vec![PathBuf::from("frc.nc"), PathBuf::from("bry.nc")],
            "ignored_on_parse",
        )
        .rho0(1000.0)
        .gamma2(1.0);

        let mut buf = Vec::new();
        emit(&settings, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed.title, settings.title);
        assert_eq!(reparsed.time_stepping, settings.time_stepping);
        assert_eq!(reparsed.bottom_drag, settings.bottom_drag);
        assert_eq!(reparsed.rho0, settings.rho0);
        assert_eq!(reparsed.gamma2, settings.gamma2);
        assert_eq!(reparsed.output_root_name, crate::runtime_settings::DEFAULT_OUTPUT_ROOT_NAME);
    }

    /// The round-trip law (SPEC_FULL §8) is only meaningfully testable
    /// across the full field set, not just the required sections — every
    /// optional physics section gets populated here.
    #[test]
    fn emit_then_parse_round_trips_every_optional_field() {
        use crate::parse::parse;
        use crate::runtime_settings::{
            BottomDrag, Initial, LinRhoEos, MarblBiogeochemistry, MyBakMixing, SCoord,
            TimeStepping, VerticalMixing,
        };
        use std::path::PathBuf;

        let settings = ROMSRuntimeSettings::new(
            "a fully populated round trip test",
            TimeStepping { ntimes: 100, dt: 30, ndtfast: 45, ninfo: 1 },
            BottomDrag { rdrg: 0.0, rdrg2: 1.0e-3, zob: 1.0e-2 },
            Initial { nrrec: 1, ininame: Some(PathBuf::from("ini.nc")) },
            vec![PathBuf::from("frc.nc"), PathBuf::from("bry.nc")],
            "ignored_on_parse",
        )
        .s_coord(SCoord { theta_s: 5.0, theta_b: 0.4, tcline: 50.0 })
        .rho0(1000.0)
        .lin_rho_eos(LinRhoEos { tcoef: 1.7e-4, t0: 14.0, scoef: 7.6e-4, s0: 35.0 })
        .marbl_biogeochemistry(MarblBiogeochemistry {
            marbl_namelist_fname: PathBuf::from("marbl_in"),
            marbl_tracer_list_fname: PathBuf::from("marbl_tracer_output_list"),
            marbl_diag_list_fname: PathBuf::from("marbl_diagnostic_output_list"),
        })
        .lateral_visc(0.0)
        .gamma2(1.0)
        .tracer_diff2(vec![0.0, 1.0e-5])
        .vertical_mixing(VerticalMixing { akv_bak: 1.0e-5, akt_bak: vec![1.0e-6, 2.0e-6] })
        .my_bak_mixing(MyBakMixing { akq_bak: 1.0e-6, q2nu2: 0.0, q2nu4: 1.0e8 })
        .sss_correction(1.0e-2)
        .sst_correction(1.0)
        .ubind(0.5)
        .v_sponge(1000.0)
        .grid(PathBuf::from("grd.nc"))
        .climatology(PathBuf::from("clm.nc"));

        let mut buf = Vec::new();
        emit(&settings, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed.title, settings.title);
        assert_eq!(reparsed.time_stepping, settings.time_stepping);
        assert_eq!(reparsed.bottom_drag, settings.bottom_drag);
        assert_eq!(reparsed.initial, settings.initial);
        assert_eq!(reparsed.forcing, settings.forcing);
        assert_eq!(reparsed.s_coord, settings.s_coord);
        assert_eq!(reparsed.rho0, settings.rho0);
        assert_eq!(reparsed.lin_rho_eos, settings.lin_rho_eos);
        assert_eq!(reparsed.marbl_biogeochemistry, settings.marbl_biogeochemistry);
        assert_eq!(reparsed.lateral_visc, settings.lateral_visc);
        assert_eq!(reparsed.gamma2, settings.gamma2);
        assert_eq!(reparsed.tracer_diff2, settings.tracer_diff2);
        assert_eq!(reparsed.vertical_mixing, settings.vertical_mixing);
        assert_eq!(reparsed.my_bak_mixing, settings.my_bak_mixing);
        assert_eq!(reparsed.sss_correction, settings.sss_correction);
        assert_eq!(reparsed.sst_correction, settings.sst_correction);
        assert_eq!(reparsed.ubind, settings.ubind);
        assert_eq!(reparsed.v_sponge, settings.v_sponge);
        assert_eq!(reparsed.grid, settings.grid);
        assert_eq!(reparsed.climatology, settings.climatology);
        assert_eq!(reparsed.output_root_name, crate::runtime_settings::DEFAULT_OUTPUT_ROOT_NAME);
    }
}
