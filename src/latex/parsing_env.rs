// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::collections::BTreeSet;

use indexmap::{map::Entry, IndexMap};

use super::tree::{Words, THEOREM_ENVIRONMENTS};

/// Simple replacement commands and the characters they stand for.
pub const REPLACEMENT_COMMANDS: [(&str, &str); 3] = [
    ("ldots", "\u{2026}"),
    ("vdots", "\u{22EE}"),
    ("cdots", "\u{22EF}"),
];

pub fn replacement_for(command: &str) -> Option<&'static str> {
    REPLACEMENT_COMMANDS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, replacement)| *replacement)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandInfo {
    /// Total number of arguments, default arguments included.
    pub argument_count: usize,
    pub eat_trailing_whitespace: bool,
    /// Values used for `[...]` arguments which are absent in the source.
    pub default_arguments: Vec<Option<Words>>,
    /// Whether unknown commands inside the arguments become literal text.
    pub accept_unknown_commands: bool,
    /// Indices of arguments parsed in URL mode, where `&` is literal.
    pub url_mode: BTreeSet<usize>,
}

impl CommandInfo {
    pub fn new(argument_count: usize, eat_trailing_whitespace: bool) -> Self {
        CommandInfo {
            argument_count,
            eat_trailing_whitespace,
            default_arguments: Vec::new(),
            accept_unknown_commands: false,
            url_mode: BTreeSet::new(),
        }
    }

    /// The shape of the matching `\end`, which never takes arguments.
    pub fn closing(&self) -> Self {
        CommandInfo::new(0, self.eat_trailing_whitespace)
    }

    pub fn defaults<'a>(&mut self, defaults: impl IntoIterator<Item = Option<&'a str>>) -> &mut Self {
        self.default_arguments = defaults.into_iter().map(|d| d.map(Words::text)).collect();
        self
    }

    pub fn accept_unknown(&mut self) -> &mut Self {
        self.accept_unknown_commands = true;
        self
    }

    pub fn url_mode(&mut self, indices: impl IntoIterator<Item = usize>) -> &mut Self {
        self.url_mode = indices.into_iter().collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageInfo {
    pub locale: &'static str,
    pub right_to_left: bool,
}

const fn ltr(locale: &'static str) -> LanguageInfo {
    LanguageInfo {
        locale,
        right_to_left: false,
    }
}

const fn rtl(locale: &'static str) -> LanguageInfo {
    LanguageInfo {
        locale,
        right_to_left: true,
    }
}

/// Babel language names understood by `\foreignlanguage`.
const LANGUAGES: [(&str, LanguageInfo); 51] = [
    ("albanian", ltr("sq")),
    ("arabic", rtl("ar")),
    ("armenian", ltr("hy")),
    ("basque", ltr("eu")),
    ("brazil", ltr("pt-br")),
    ("brazilian", ltr("pt-br")),
    ("breton", ltr("br")),
    ("bulgarian", ltr("bg")),
    ("catalan", ltr("ca")),
    ("croatian", ltr("hr")),
    ("czech", ltr("cs")),
    ("danish", ltr("da")),
    ("dutch", ltr("nl")),
    ("english", ltr("en")),
    ("esperanto", ltr("eo")),
    ("estonian", ltr("et")),
    ("farsi", rtl("fa")),
    ("finnish", ltr("fi")),
    ("french", ltr("fr")),
    ("friulan", ltr("fur")),
    ("galician", ltr("gl")),
    ("german", ltr("de")),
    ("greek", ltr("el")),
    ("hebrew", rtl("he")),
    ("icelandic", ltr("is")),
    ("irish", ltr("ga")),
    ("italian", ltr("it")),
    ("latin", ltr("la")),
    ("latvian", ltr("lv")),
    ("lithuanian", ltr("lt")),
    ("magyar", ltr("hu")),
    ("norsk", ltr("nb")),
    ("nynorsk", ltr("nn")),
    ("occitan", ltr("oc")),
    ("piedmontese", ltr("pms")),
    ("polish", ltr("pl")),
    ("portuges", ltr("pt")),
    ("romanian", ltr("ro")),
    ("romansh", ltr("rm")),
    ("russian", ltr("ru")),
    ("scottish", ltr("sco")),
    ("serbian", ltr("sr")),
    ("slovak", ltr("sk")),
    ("slovenian", ltr("sl")),
    ("spanish", ltr("es")),
    ("swedish", ltr("sv")),
    ("turkish", ltr("tr")),
    ("turkmen", ltr("tk")),
    ("ukrainian", ltr("uk")),
    ("urdu", rtl("ur")),
    ("welsh", ltr("cy")),
];

/// Registry of the commands and environments the parser understands.
#[derive(Debug, Clone)]
pub struct ParsingEnvironment {
    commands: IndexMap<String, CommandInfo>,
    environments: IndexMap<String, CommandInfo>,
    languages: IndexMap<String, LanguageInfo>,
}

impl Default for ParsingEnvironment {
    fn default() -> Self {
        let mut env = ParsingEnvironment {
            commands: IndexMap::new(),
            environments: IndexMap::new(),
            languages: LANGUAGES.iter().map(|(name, info)| (name.to_string(), *info)).collect(),
        };

        env.register_command("item", 0);
        env.register_command_ws("code", 1);
        env.register_command_ws("textbf", 1);
        env.register_command_ws("textit", 1);
        env.register_command_ws("texttt", 1);
        env.register_command_ws("emph", 1);
        env.register_command("newpar", 0);
        env.register_command("chapter", 1);
        env.register_command("section", 1);
        env.register_command("subsection", 1);
        env.register_command("subsubsection", 1);
        env.register_command_ws("href", 2).url_mode([0]);
        env.register_command_ws("url", 1).url_mode([0]);
        env.register_command_ws("label", 1);
        env.register_command_ws("ref", 2).defaults([None]);
        env.register_command_ws("symbol", 1);
        env.register_command_ws("foreignlanguage", 2);
        env.register_command("qed", 0);
        env.register_command("includegraphics", 2).defaults([None]).accept_unknown();
        env.register_command("setlength", 2).accept_unknown();
        env.register_command("noindent", 0);
        env.register_command("hline", 0);
        env.register_command("cline", 1);
        for (name, _) in REPLACEMENT_COMMANDS {
            env.register_command_ws(name, 0);
        }

        env.register_environment_ws("codelisting", 1);
        for name in THEOREM_ENVIRONMENTS {
            env.register_environment(name, 1).defaults([None]);
        }
        env.register_environment("align*", 0);
        env.register_environment("align", 0);
        env.register_environment("itemize", 0);
        env.register_environment("enumerate", 0);
        env.register_environment("tikzpicture", 1).defaults([None]).accept_unknown();
        env.register_environment("pstricks", 1).accept_unknown();
        env.register_environment("blockquote", 0);
        env.register_environment("center", 0);
        env.register_environment("picturegroup", 0);
        env.register_environment("formulalist", 1).defaults([Some("1")]);
        env.register_environment("tabular", 1);
        env
    }
}

impl ParsingEnvironment {
    /// Registers a command which eats trailing whitespace.
    pub fn register_command(&mut self, name: &str, argument_count: usize) -> &mut CommandInfo {
        Self::insert(&mut self.commands, name, CommandInfo::new(argument_count, true))
    }

    /// Registers a command which keeps trailing whitespace.
    pub fn register_command_ws(&mut self, name: &str, argument_count: usize) -> &mut CommandInfo {
        Self::insert(&mut self.commands, name, CommandInfo::new(argument_count, false))
    }

    pub fn register_environment(&mut self, name: &str, argument_count: usize) -> &mut CommandInfo {
        Self::insert(&mut self.environments, name, CommandInfo::new(argument_count, true))
    }

    pub fn register_environment_ws(&mut self, name: &str, argument_count: usize) -> &mut CommandInfo {
        Self::insert(&mut self.environments, name, CommandInfo::new(argument_count, false))
    }

    fn insert<'a>(map: &'a mut IndexMap<String, CommandInfo>, name: &str, info: CommandInfo) -> &'a mut CommandInfo {
        match map.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(info);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(info),
        }
    }

    pub fn command(&self, name: &str) -> Option<&CommandInfo> {
        self.commands.get(name)
    }

    pub fn environment(&self, name: &str) -> Option<&CommandInfo> {
        self.environments.get(name)
    }

    pub fn language(&self, name: &str) -> Option<&LanguageInfo> {
        self.languages.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let env = ParsingEnvironment::default();

        let href = env.command("href").unwrap();
        assert_eq!(href.argument_count, 2);
        assert!(!href.eat_trailing_whitespace);
        assert!(href.url_mode.contains(&0));

        let gfx = env.command("includegraphics").unwrap();
        assert_eq!(gfx.default_arguments, vec![None]);
        assert!(gfx.accept_unknown_commands);
        assert!(gfx.eat_trailing_whitespace);

        let list = env.environment("formulalist").unwrap();
        assert_eq!(list.default_arguments, vec![Some(Words::text("1"))]);

        assert!(env.environment("proof").is_some());
        assert!(env.command("proof").is_none());
        assert_eq!(env.commands.keys().next().map(String::as_str), Some("item"));
    }

    #[test]
    fn test_register_overrides() {
        let mut env = ParsingEnvironment::default();
        env.register_command_ws("marginpar", 1).accept_unknown();
        env.register_command("label", 1);
        assert!(env.command("marginpar").unwrap().accept_unknown_commands);
        assert!(env.command("label").unwrap().eat_trailing_whitespace);
    }

    #[test]
    fn test_languages() {
        let env = ParsingEnvironment::default();
        assert_eq!(env.language("finnish").unwrap().locale, "fi");
        assert!(env.language("hebrew").unwrap().right_to_left);
        assert!(!env.language("greek").unwrap().right_to_left);
        assert!(env.language("klingon").is_none());
        assert_eq!(replacement_for("vdots"), Some("\u{22EE}"));
    }
}
