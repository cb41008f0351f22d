// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::{
    collections::BTreeMap,
    fmt,
    path::PathBuf,
    process::{Command, Output, Stdio},
};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use super::{quantize_color_component, FormulaType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Latex,
    Luatex,
    Xetex,
}

impl Engine {
    pub fn name(self) -> &'static str {
        match self {
            Engine::Latex => "latex",
            Engine::Luatex => "luatex",
            Engine::Xetex => "xetex",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Svg,
    Svgz,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
            OutputFormat::Svgz => "svgz",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Svg | OutputFormat::Svgz => "image/svg+xml",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Formula type '{kind}' not supported by engine '{engine}'!")]
    UnsupportedType { kind: String, engine: Engine },

    #[error("Don't know how to convert from '{from}' to '{to}'!")]
    UnknownConversion { from: String, to: String },

    #[error("Cannot interpret pstricks argument {key}='{value}'!")]
    InvalidArgument { key: String, value: String },

    #[error("Cannot find program \"{0}\"!")]
    MissingProgram(String),

    #[error("Cannot find input file \"{input}\" (needed for \"{program}\")!")]
    MissingInput { input: Utf8PathBuf, program: String },

    #[error("Temporary directory {0:?} is not a valid UTF-8 path!")]
    TempDir(PathBuf),

    #[error("{message}")]
    Failed { return_code: Option<i32>, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

const SEPARATOR_WIDTH: usize = 79;

const ARTICLE_HEAD: &str = r"\documentclass{article}
\usepackage[left=0cm,right=0cm,top=0cm,bottom=0cm,landscape,a0paper]{geometry}
\usepackage[utf8]{inputenc}
\usepackage[T1]{fontenc}
\usepackage{xcolor}
";

const STANDALONE_HEAD: &str = r"\documentclass{standalone}
\usepackage[utf8]{inputenc}
\usepackage[T1]{fontenc}
\usepackage{xcolor}
";

const LUATEX_STANDALONE_HEAD: &str = r"\RequirePackage{luatex85}
\documentclass{standalone}
\usepackage[T1]{fontenc}
\usepackage{xcolor}
";

const UNICODE_STANDALONE_HEAD: &str = r"\documentclass{standalone}
\usepackage[T1]{fontenc}
\usepackage{xcolor}
";

const UNICODE_ARTICLE_HEAD: &str = r"\documentclass{article}
\usepackage[T1]{fontenc}
\usepackage{xcolor}
";

const MIDDLE: &str = r"\pagestyle{empty}
\begin{document}
\color{mycolor}
";

const TAIL: &str = r"\end{document}
";

/// What a step does to its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Runs a program. Arguments may contain the placeholders `{input}`,
    /// `{output}`, `{basename}` and `{tempdir}`.
    Run(Vec<String>),
    Rename,
}

/// How a failing step is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// The TeX run itself; the report includes the `.tex` file and the
    /// captured output.
    Latex,
    Message(String),
    Generic,
}

/// One stage of the pipeline, producing `<basename>.<format>` in the
/// temporary directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub format: &'static str,
    pub action: Action,
    pub capture_output: bool,
    pub error: StepError,
}

impl Step {
    fn run(format: &'static str, args: &[&str], error: StepError) -> Self {
        Step {
            format,
            action: Action::Run(args.iter().map(|arg| arg.to_string()).collect()),
            capture_output: false,
            error,
        }
    }

    fn latex(program: &str, format: &'static str) -> Self {
        let args = [
            program,
            "--halt-on-error",
            "-interaction",
            "nonstopmode",
            "-no-shell-escape",
            "-output-directory",
            "{tempdir}",
            "-jobname",
            "{basename}",
            "{input}",
        ];
        Step {
            capture_output: true,
            ..Step::run(format, &args, StepError::Latex)
        }
    }

    fn rename(format: &'static str) -> Self {
        Step {
            format,
            action: Action::Rename,
            capture_output: false,
            error: StepError::Generic,
        }
    }

    fn program(&self) -> &str {
        match &self.action {
            Action::Run(args) => args.first().map(String::as_str).unwrap_or_default(),
            Action::Rename => "rename",
        }
    }
}

/// How one formula type is turned into an intermediate file by an engine.
struct Route {
    program: &'static str,
    head: &'static str,
    steps: Vec<Step>,
}

impl Route {
    fn new(program: &'static str, head: &'static str, format: &'static str) -> Self {
        Route {
            program,
            head,
            steps: vec![Step::latex(program, format)],
        }
    }

    fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// `pdfcrop` after the run, for article-class documents.
    fn cropped(self) -> Self {
        self.then(Step::rename("tmp.pdf"))
            .then(Step::run("pdf", &["pdfcrop", "-margin", "3", "{input}", "{output}"], StepError::Generic))
    }
}

fn route(engine: Engine, kind: &FormulaType) -> Result<Route, PipelineError> {
    use FormulaType::*;

    Ok(match (engine, kind) {
        (Engine::Latex, Inline | TikzPicture(_)) => Route::new("pdflatex", STANDALONE_HEAD, "pdf"),
        (Engine::Latex, Display | Align) => Route::new("latex", ARTICLE_HEAD, "dvi"),
        (Engine::Latex, PsTricks(_)) => Route::new("latex", ARTICLE_HEAD, "dvi").then(Step::run(
            "eps",
            &["dvips", "{input}", "-E", "-o", "{output}"],
            StepError::Message("Cannot convert DVI file to PS file!".into()),
        )),
        (Engine::Luatex, Inline | Display | TikzPicture(_)) => {
            Route::new("lualatex", LUATEX_STANDALONE_HEAD, "pdf")
        }
        (Engine::Luatex, Align) => Route::new("lualatex", UNICODE_ARTICLE_HEAD, "pdf").cropped(),
        (Engine::Xetex, Inline | Display | TikzPicture(_) | PsTricks(_)) => {
            Route::new("xelatex", UNICODE_STANDALONE_HEAD, "pdf")
        }
        (Engine::Xetex, Align) => Route::new("xelatex", UNICODE_ARTICLE_HEAD, "pdf").cropped(),
        (engine, kind) => {
            return Err(PipelineError::UnsupportedType {
                kind: kind.name().to_string(),
                engine,
            })
        }
    })
}

/// Steps turning an intermediate file of format `from` into `to`.
fn conversion_steps(from: &str, to: OutputFormat, scale: f64) -> Result<Vec<Step>, PipelineError> {
    let density = density(scale);
    let steps = match (to, from) {
        (OutputFormat::Png, "eps" | "ps" | "pdf") => vec![Step::run(
            "png",
            &["convert", "-density", &density, "{input}", "{output}"],
            StepError::Message(format!("Cannot convert {} file to PNG file!", from.to_uppercase())),
        )],
        (OutputFormat::Png, "dvi") => {
            let args: [&str; 12] = [
                "dvipng", "{input}", "-bg", "Transparent", "-T", "tight", "-D", &density, "-z", "9", "-o", "{output}",
            ];
            vec![Step::run(
                "png",
                &args,
                StepError::Message("Cannot convert DVI file to PNG file!".into()),
            )]
        }
        (OutputFormat::Svg | OutputFormat::Svgz, "pdf") => {
            let mut steps = vec![
                Step::run(
                    "tmp.pdf",
                    &["gs", "-o", "{output}", "-dNoOutputFonts", "-sDEVICE=pdfwrite", "{input}"],
                    StepError::Message("Cannot convert text in PDF file to outlines!".into()),
                ),
                Step::run(
                    "svg",
                    &["pdf2svg", "{input}", "{output}"],
                    StepError::Message("Cannot convert PDF file to SVG file!".into()),
                ),
            ];
            if to == OutputFormat::Svgz {
                steps.push(Step::run(
                    "svgz",
                    &["gzip", "-S", "z", "{input}"],
                    StepError::Message("Cannot compress SVG file!".into()),
                ));
            }
            steps
        }
        (OutputFormat::Svg | OutputFormat::Svgz, "dvi" | "eps" | "ps") => {
            let mut args = vec!["dvisvgm", "-n"];
            if from != "dvi" {
                args.push("-E");
            }
            if to == OutputFormat::Svgz {
                args.push("-z");
            }
            args.extend(["{input}", "-o", "{output}"]);
            vec![Step::run(
                to.extension(),
                &args,
                StepError::Message(format!(
                    "Cannot convert {} file to {} file!",
                    from.to_uppercase(),
                    to.extension().to_uppercase()
                )),
            )]
        }
        _ if from == to.extension() => vec![],
        _ => {
            return Err(PipelineError::UnknownConversion {
                from: from.to_string(),
                to: to.extension().to_string(),
            })
        }
    };
    Ok(steps)
}

/// `int(100 * scale)`, the resolution used by the rasterizers.
pub fn density(scale: f64) -> String {
    ((100.0 * scale) as i64).to_string()
}

/// Formats a real number the way the TeX sources expect it: integral values
/// keep one decimal, e.g. `2.0`.
fn real(value: f64) -> String {
    match value.is_finite() && value.fract() == 0.0 {
        true => format!("{:.1}", value),
        false => value.to_string(),
    }
}

/// Renders formula bodies to image bytes with external TeX tools.
#[derive(Debug, Clone, Default)]
pub struct FormulaPipeline {
    pub engine: Engine,
    pub output_format: OutputFormat,
    /// Preamble fragments keyed by `""`, program name, `tikz`, `pstricks` or `xy`.
    pub additional_preamble: BTreeMap<String, String>,
    pub optimize_png: bool,
}

impl FormulaPipeline {
    fn header(&self, body: &str, color: [f64; 3], kind: &FormulaType, program: &str) -> String {
        let tikz = matches!(kind, FormulaType::TikzPicture(_));
        let pstricks = matches!(kind, FormulaType::PsTricks(_));
        let xy = body.contains(r"\xymatrix");

        let mut header = String::new();
        if tikz {
            header.push_str("\\usepackage{tikz,pgffor}\n");
        }
        if pstricks {
            header.push_str("\\usepackage{pstricks}\n");
        }
        if xy {
            header.push_str("\\usepackage{xypic}\n");
        }
        if *kind == FormulaType::Align {
            header.push_str("\\usepackage{amsmath}\n");
        }

        let rgb = color.map(|c| real(quantize_color_component(c) as f64 / 255.0));
        header.push_str(&format!("\n\\definecolor{{mycolor}}{{rgb}}{{{} {} {}}}\n", rgb[0], rgb[1], rgb[2]));

        let indices = [("", true), (program, true), ("tikz", tikz), ("pstricks", pstricks), ("xy", xy)];
        for (index, _) in indices.iter().filter(|(_, enabled)| *enabled) {
            if let Some(preamble) = self.additional_preamble.get(*index).filter(|p| !p.is_empty()) {
                header.push_str(&format!("\n% Additional preamble ('{}')\n{}\n", index, preamble));
            }
        }
        header
    }

    fn form_head_tail(kind: &FormulaType) -> Result<(String, String), PipelineError> {
        Ok(match kind {
            FormulaType::Inline => (r"\(".into(), r"\)".into()),
            FormulaType::Display => (r"\(\displaystyle{}".into(), r"\)".into()),
            FormulaType::Align => (r"\begin{align*}".into(), r"\end{align*}".into()),
            FormulaType::TikzPicture(args) => {
                let args = args.as_ref().map(|args| format!("[{}]", args)).unwrap_or_default();
                (format!("\\begin{{tikzpicture}}{}\n", args), "\n\\end{tikzpicture}".into())
            }
            FormulaType::PsTricks(args) => {
                let arg = |key: &str| -> Result<&str, PipelineError> {
                    args.get(key).map(String::as_str).ok_or_else(|| PipelineError::InvalidArgument {
                        key: key.to_string(),
                        value: String::new(),
                    })
                };
                let number = |key: &str| -> Result<f64, PipelineError> {
                    let value = arg(key)?;
                    value.trim().parse().map_err(|_| PipelineError::InvalidArgument {
                        key: key.to_string(),
                        value: value.to_string(),
                    })
                };
                let width = number("right")? - number("left")?;
                let height = number("top")? - number("bottom")?;
                let unit = arg("unit")?;
                let (w, h, tick) = (real(width), real(height), real(width / 1000.0));
                let head = format!(
                    "\\setlength{{\\unitlength}}{{{unit}}}\\psset{{unit={unit}}}\n\
                     \\begin{{picture}}({w},{h})(0,0)\n\
                     \\put(0,0){{\\white\\line(1,0){{{tick}}}}}\n\
                     \\put({w},{h}){{\\white\\line(-1,0){{{tick}}}}}\n\
                     \\put(0,0){{\\begin{{pspicture}}({left},{bottom})({right},{top})\n",
                    unit = unit,
                    w = w,
                    h = h,
                    tick = tick,
                    left = arg("left")?,
                    bottom = arg("bottom")?,
                    right = arg("right")?,
                    top = arg("top")?,
                );
                (head, "\n\\end{pspicture}}\\end{picture}".into())
            }
        })
    }

    /// The complete `.tex` document for a formula.
    pub fn tex_source(&self, body: &str, color: [f64; 3], kind: &FormulaType) -> Result<String, PipelineError> {
        let route = route(self.engine, kind)?;
        let (form_head, form_tail) = Self::form_head_tail(kind)?;
        Ok([
            route.head,
            &self.header(body, color, kind, route.program),
            MIDDLE,
            &form_head,
            body,
            &form_tail,
            "\n",
            TAIL,
        ]
        .concat())
    }

    /// Every step after writing the `.tex` file, ending with a file in the
    /// configured output format.
    pub fn steps(&self, kind: &FormulaType, scale: f64) -> Result<Vec<Step>, PipelineError> {
        let mut steps = route(self.engine, kind)?.steps;
        let intermediate = steps.last().map(|step| step.format).unwrap_or("tex");
        steps.extend(conversion_steps(intermediate, self.output_format, scale)?);
        if self.optimize_png && self.output_format == OutputFormat::Png {
            steps.push(Step::run(
                "png",
                &["optipng", "-quiet", "{input}"],
                StepError::Message("Cannot optimize PNG file!".into()),
            ));
        }
        Ok(steps)
    }

    /// Renders `body` in a fresh temporary directory, which is removed
    /// afterwards whether or not rendering succeeded.
    pub fn render(
        &self,
        body: &str,
        kind: &FormulaType,
        color: [f64; 3],
        scale: f64,
        base_name: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        let tex = self.tex_source(body, color, kind)?;
        let steps = self.steps(kind, scale)?;
        tracing::info!("Converting formula {}({} w/{}): '{}'", base_name, kind.name(), self.engine, body);

        let tempdir = tempfile::Builder::new().prefix("texpage-formula-").tempdir()?;
        let dir = Utf8Path::from_path(tempdir.path()).ok_or_else(|| PipelineError::TempDir(tempdir.path().into()))?;

        let mut current = dir.join(format!("{}.tex", base_name));
        std::fs::write(&current, tex)?;
        for step in &steps {
            current = execute(step, &current, base_name, dir)?;
        }
        Ok(std::fs::read(&current)?)
    }
}

/// Runs one step on `input` and returns the file it produced.
pub fn execute(step: &Step, input: &Utf8Path, base_name: &str, tempdir: &Utf8Path) -> Result<Utf8PathBuf, PipelineError> {
    if !input.exists() {
        return Err(PipelineError::MissingInput {
            input: input.to_owned(),
            program: step.program().to_string(),
        });
    }
    let output = tempdir.join(format!("{}.{}", base_name, step.format));

    let args = match &step.action {
        Action::Rename => {
            std::fs::rename(input, &output)?;
            return Ok(output);
        }
        Action::Run(args) => args,
    };
    let command_line: Vec<String> = args
        .iter()
        .map(|arg| {
            arg.replace("{input}", input.as_str())
                .replace("{output}", output.as_str())
                .replace("{basename}", base_name)
                .replace("{tempdir}", tempdir.as_str())
        })
        .collect();
    let Some((program, arguments)) = command_line.split_first() else {
        return Err(PipelineError::MissingProgram(String::new()));
    };
    let program_path = which::which(program).map_err(|_| PipelineError::MissingProgram(program.clone()))?;

    tracing::debug!("Executing \"{}\"...", command_line.join(" "));
    let mut command = Command::new(program_path);
    command.args(arguments).current_dir(tempdir).stdin(Stdio::null());
    let (status, captured) = match step.capture_output {
        true => {
            let output = command.output()?;
            (output.status, Some(output))
        }
        false => (command.stdout(Stdio::null()).stderr(Stdio::null()).status()?, None),
    };

    if !status.success() {
        let content = std::fs::read(input)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_else(|_| "(cannot read contents)".to_string());
        let report = FailureReport {
            program,
            command_line: &command_line.join(" "),
            return_code: status.code(),
            input: &content,
            captured: captured.as_ref(),
        };
        return Err(PipelineError::Failed {
            return_code: status.code(),
            message: report.message(&step.error),
        });
    }
    Ok(output)
}

struct FailureReport<'a> {
    program: &'a str,
    command_line: &'a str,
    return_code: Option<i32>,
    input: &'a str,
    captured: Option<&'a Output>,
}

impl FailureReport<'_> {
    fn message(&self, error: &StepError) -> String {
        let separator = "-".repeat(SEPARATOR_WIDTH);
        let code = self.return_code.map_or_else(|| "(signal)".to_string(), |code| code.to_string());
        let (stdout, stderr) = match self.captured {
            Some(output) => (
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ),
            None => Default::default(),
        };
        match (error, self.captured) {
            (StepError::Message(message), _) => message.clone(),
            (StepError::Latex, _) => format!(
                "Error {code} while running {program}! LaTeX file:\n{sep}\n{input}\n{sep}\n\
                 LaTeX output (stdout):\n{sep}\n{stdout}\n{sep}\n\
                 LaTeX error output (stderr):\n{sep}\n{stderr}\n{sep}",
                code = code,
                program = self.program,
                sep = separator,
                input = self.input,
                stdout = stdout,
                stderr = stderr,
            ),
            (StepError::Generic, Some(_)) => format!(
                "Error {code} while running '{command}'! Input file:\n{sep}\n{input}\n{sep}\n\
                 Output (stdout):\n{sep}\n{stdout}\n{sep}\n\
                 Error output (stderr):\n{sep}\n{stderr}\n{sep}",
                code = code,
                command = self.command_line,
                sep = separator,
                input = self.input,
                stdout = stdout,
                stderr = stderr,
            ),
            (StepError::Generic, None) => format!("Error while running '{}'!", self.command_line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(engine: Engine, output_format: OutputFormat) -> FormulaPipeline {
        FormulaPipeline {
            engine,
            output_format,
            ..Default::default()
        }
    }

    fn programs(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(Step::program).collect()
    }

    fn pstricks() -> FormulaType {
        FormulaType::PsTricks(BTreeMap::from([
            ("left".to_string(), "0".to_string()),
            ("right".to_string(), "2".to_string()),
            ("bottom".to_string(), "-1".to_string()),
            ("top".to_string(), "1.5".to_string()),
            ("unit".to_string(), "1cm".to_string()),
        ]))
    }

    #[test]
    fn test_inline_tex_source() {
        let tex = pipeline(Engine::Latex, OutputFormat::Png)
            .tex_source(" x^2 ", [1.0, 0.5, 0.0], &FormulaType::Inline)
            .unwrap();
        assert_eq!(
            tex,
            "\\documentclass{standalone}\n\\usepackage[utf8]{inputenc}\n\\usepackage[T1]{fontenc}\n\\usepackage{xcolor}\n\
             \n\\definecolor{mycolor}{rgb}{1.0 0.4980392156862745 0.0}\n\
             \\pagestyle{empty}\n\\begin{document}\n\\color{mycolor}\n\
             \\( x^2 \\)\n\\end{document}\n"
        );
    }

    #[test]
    fn test_header_packages_and_preambles() {
        let mut pipeline = pipeline(Engine::Latex, OutputFormat::Png);
        pipeline.additional_preamble = BTreeMap::from([
            ("".to_string(), "\\usepackage{amssymb}".to_string()),
            ("pdflatex".to_string(), "% pdf".to_string()),
            ("latex".to_string(), "% dvi".to_string()),
            ("tikz".to_string(), "\\usetikzlibrary{arrows}".to_string()),
            ("xy".to_string(), String::new()),
        ]);
        let tex = pipeline
            .tex_source("\\xymatrix{A \\ar[r] & B}", [0.0; 3], &FormulaType::TikzPicture(Some("scale=2".into())))
            .unwrap();
        assert!(tex.contains(
            "\\usepackage{tikz,pgffor}\n\\usepackage{xypic}\n\n\\definecolor{mycolor}{rgb}{0.0 0.0 0.0}\n\
             \n% Additional preamble ('')\n\\usepackage{amssymb}\n\
             \n% Additional preamble ('pdflatex')\n% pdf\n\
             \n% Additional preamble ('tikz')\n\\usetikzlibrary{arrows}\n\\pagestyle{empty}"
        ));
        assert!(!tex.contains("% dvi"));
        assert!(tex.contains("\\begin{tikzpicture}[scale=2]\n\\xymatrix{A \\ar[r] & B}\n\\end{tikzpicture}\n\\end{document}\n"));
    }

    #[test]
    fn test_align_uses_article() {
        let tex = pipeline(Engine::Latex, OutputFormat::Png)
            .tex_source("a &= b", [0.0; 3], &FormulaType::Align)
            .unwrap();
        assert!(tex.starts_with(ARTICLE_HEAD));
        assert!(tex.contains("\\usepackage{amsmath}\n"));
        assert!(tex.contains("\\begin{align*}a &= b\\end{align*}\n"));
    }

    #[test]
    fn test_pstricks_form() {
        let tex = pipeline(Engine::Latex, OutputFormat::Png)
            .tex_source("\\psline(0,0)(1,1)", [0.0; 3], &pstricks())
            .unwrap();
        assert!(tex.contains(
            "\\setlength{\\unitlength}{1cm}\\psset{unit=1cm}\n\
             \\begin{picture}(2.0,2.5)(0,0)\n\
             \\put(0,0){\\white\\line(1,0){0.002}}\n\
             \\put(2.0,2.5){\\white\\line(-1,0){0.002}}\n\
             \\put(0,0){\\begin{pspicture}(0,-1)(2,1.5)\n\
             \\psline(0,0)(1,1)\n\\end{pspicture}}\\end{picture}\n"
        ));

        let mut args = BTreeMap::new();
        args.insert("left".to_string(), "wide".to_string());
        let error = pipeline(Engine::Latex, OutputFormat::Png)
            .tex_source("", [0.0; 3], &FormulaType::PsTricks(args))
            .unwrap_err();
        assert!(matches!(error, PipelineError::InvalidArgument { .. }));
    }

    #[test]
    fn test_latex_routes() {
        let png = pipeline(Engine::Latex, OutputFormat::Png);
        assert_eq!(programs(&png.steps(&FormulaType::Inline, 1.25).unwrap()), ["pdflatex", "convert"]);
        assert_eq!(programs(&png.steps(&FormulaType::Display, 1.25).unwrap()), ["latex", "dvipng"]);
        assert_eq!(programs(&png.steps(&pstricks(), 1.25).unwrap()), ["latex", "dvips", "convert"]);

        let steps = png.steps(&FormulaType::Display, 1.25).unwrap();
        assert_eq!(
            steps[1].action,
            Action::Run(
                ["dvipng", "{input}", "-bg", "Transparent", "-T", "tight", "-D", "125", "-z", "9", "-o", "{output}"]
                    .map(String::from)
                    .to_vec()
            )
        );

        let svgz = pipeline(Engine::Latex, OutputFormat::Svgz);
        assert_eq!(
            programs(&svgz.steps(&FormulaType::TikzPicture(None), 1.0).unwrap()),
            ["pdflatex", "gs", "pdf2svg", "gzip"]
        );
        let steps = svgz.steps(&pstricks(), 1.0).unwrap();
        assert_eq!(
            steps[2].action,
            Action::Run(["dvisvgm", "-n", "-E", "-z", "{input}", "-o", "{output}"].map(String::from).to_vec())
        );
        assert_eq!(steps[2].format, "svgz");
    }

    #[test]
    fn test_unicode_engines() {
        let luatex = pipeline(Engine::Luatex, OutputFormat::Svg);
        assert_eq!(
            programs(&luatex.steps(&FormulaType::Align, 1.0).unwrap()),
            ["lualatex", "rename", "pdfcrop", "gs", "pdf2svg"]
        );
        assert!(matches!(
            luatex.steps(&pstricks(), 1.0),
            Err(PipelineError::UnsupportedType { engine: Engine::Luatex, .. })
        ));
        let tex = luatex.tex_source("x", [0.0; 3], &FormulaType::Display).unwrap();
        assert!(tex.starts_with(LUATEX_STANDALONE_HEAD));
        assert!(tex.contains("\\(\\displaystyle{}x\\)"));

        let xetex = pipeline(Engine::Xetex, OutputFormat::Png);
        assert_eq!(programs(&xetex.steps(&pstricks(), 1.0).unwrap()), ["xelatex", "convert"]);
    }

    #[test]
    fn test_optimize_png() {
        let mut png = pipeline(Engine::Latex, OutputFormat::Png);
        png.optimize_png = true;
        assert_eq!(programs(&png.steps(&FormulaType::Inline, 1.0).unwrap()), ["pdflatex", "convert", "optipng"]);
        let mut svg = pipeline(Engine::Latex, OutputFormat::Svg);
        svg.optimize_png = true;
        assert_eq!(programs(&svg.steps(&FormulaType::Inline, 1.0).unwrap()), ["pdflatex", "gs", "pdf2svg"]);
    }

    #[test]
    fn test_unknown_conversion() {
        assert!(matches!(
            conversion_steps("xdv", OutputFormat::Png, 1.0),
            Err(PipelineError::UnknownConversion { .. })
        ));
    }

    #[test]
    fn test_execute_rename_and_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let input = dir.join("f.pdf");
        std::fs::write(&input, b"%PDF").unwrap();

        let output = execute(&Step::rename("tmp.pdf"), &input, "f", dir).unwrap();
        assert_eq!(output, dir.join("f.tmp.pdf"));
        assert_eq!(std::fs::read(&output).unwrap(), b"%PDF");

        let error = execute(&Step::rename("tmp.pdf"), &input, "f", dir).unwrap_err();
        assert!(matches!(error, PipelineError::MissingInput { .. }));
    }

    #[test]
    fn test_execute_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let input = dir.join("f.tex");
        std::fs::write(&input, "x").unwrap();
        let step = Step::run("pdf", &["texpage-no-such-program", "{input}"], StepError::Generic);
        assert!(matches!(
            execute(&step, &input, "f", dir),
            Err(PipelineError::MissingProgram(program)) if program == "texpage-no-such-program"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_failure_report() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let input = dir.join("f.tex");
        std::fs::write(&input, "\\relax").unwrap();

        let mut step = Step::run("pdf", &["sh", "-c", "echo out; echo err >&2; exit 3"], StepError::Generic);
        step.capture_output = true;
        let error = execute(&step, &input, "f", dir).unwrap_err();
        let PipelineError::Failed { return_code, message } = error else {
            panic!("unexpected error");
        };
        let separator = "-".repeat(79);
        assert_eq!(return_code, Some(3));
        assert_eq!(
            message,
            format!(
                "Error 3 while running 'sh -c echo out; echo err >&2; exit 3'! Input file:\n{0}\n\\relax\n{0}\n\
                 Output (stdout):\n{0}\nout\n\n{0}\nError output (stderr):\n{0}\nerr\n\n{0}",
                separator
            )
        );

        step.capture_output = false;
        let error = execute(&step, &input, "f", dir).unwrap_err();
        assert_eq!(error.to_string(), "Error while running 'sh -c echo out; echo err >&2; exit 3'!");

        step.error = StepError::Message("Cannot convert PDF file to SVG file!".into());
        let error = execute(&step, &input, "f", dir).unwrap_err();
        assert_eq!(error.to_string(), "Cannot convert PDF file to SVG file!");
    }
}
