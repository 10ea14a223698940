//! Whole-script compiles: sections, values, checkpoints and references
//! working together.

mod common;

use common::{compile, dump_tokens, messages};
use pretty_assertions::assert_eq;
use serde_json::json;
use sparkdown_compiler::{
    CompileOptions, LiteralCallbacks, OutlineKind, ROOT_SECTION, ReferenceKind, Severity,
    TokenKind, compile_script,
};

#[test]
fn sections_dialogue_and_jumps() {
    let program = compile("# Start\nJohn: Hello.\n\n-> End\n# End\nJohn: Bye.");
    assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);

    let ids: Vec<_> = program.sections.keys().map(String::as_str).collect();
    assert_eq!(ids, vec![ROOT_SECTION, "End", "Start"]);

    for section in ["Start", "End"] {
        let dialogue: Vec<_> = program
            .section_tokens(section)
            .into_iter()
            .filter_map(|token| match &token.kind {
                TokenKind::Dialogue { character, .. } => Some(character.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(dialogue, vec!["john"], "dialogue in {section}");
    }

    let jump = &program.metadata.references[0];
    assert_eq!(jump.kind, ReferenceKind::Section);
    assert_eq!(jump.target.as_deref(), Some("End"));
    assert_eq!(program.value("character", "john"), Some(&json!({"name": "John"})));
}

#[test]
fn struct_instances_inherit_defaults() {
    let program = compile("define T:\n  x = 1\n  y = \"a\"\n\ndefine v: T\n  x = 2\n\ndefine w: T\n");
    assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);
    assert_eq!(program.variables["T.v"].compiled, json!({"x": 2, "y": "a"}));
    assert_eq!(program.variables["T.w"].compiled, json!({"x": 1, "y": "a"}));
    assert_eq!(program.value("T", "$default"), Some(&json!({"x": 1, "y": "a"})));
}

#[test]
fn defaults_declared_after_use_still_apply() {
    let program = compile("define character.mara:\n  age = 30\n\ndefine character:\n  color = \"red\"\n");
    assert_eq!(
        program.value("character", "mara"),
        Some(&json!({"age": 30, "color": "red"}))
    );
}

#[test]
fn character_defaults_reach_implicit_speakers() {
    let program = compile("define character:\n  color = \"blue\"\n\nOld Man: Hm.\n");
    assert_eq!(
        program.value("character", "old_man"),
        Some(&json!({"color": "blue", "name": "Old Man"}))
    );
    assert!(program.variables["character.old_man"].implicit);
}

#[test]
fn duplicate_section_points_at_the_first() {
    let program = compile("# A\nText.\n# A\nMore.\n");
    assert_eq!(messages(&program), vec!["'A' is already declared"]);
    let action = &program.diagnostics[0].actions[0];
    assert_eq!(action.label, "Jump to declaration");
    let focus = action.focus.unwrap();
    assert_eq!((focus.from, focus.to), (2, 3));
}

#[test]
fn checkpoints_collapse_onto_the_preceding_token() {
    let inline = compile("# S\nJohn: Hi. ^greet\n");
    assert_eq!(inline.sections["S"].checkpoints, vec!["S.greet"]);
    assert_eq!(inline.tokens[0].checkpoint.as_deref(), Some("S.greet"));

    let next_line = compile("# S\nThe door opens.\n^open\n");
    assert_eq!(next_line.sections["S"].checkpoints, vec!["S.open"]);

    let standalone = compile("# S\n^top\n\nText.\n");
    assert_eq!(standalone.sections["S"].checkpoints, vec!["S.top", "S.1"]);

    let root = compile("Text.\n");
    assert_eq!(root.sections[ROOT_SECTION].checkpoints, vec!["0"]);
}

#[test]
fn unresolved_references_are_errors_but_recorded() {
    let program = compile("-> Missing\n\nA shadow. [[ghost]]\n");
    assert_eq!(
        messages(&program),
        vec!["cannot find section 'Missing'", "cannot find asset 'ghost'"]
    );
    assert!(program.has_errors());
    let names: Vec<_> = program
        .metadata
        .references
        .iter()
        .map(|r| (r.name.as_str(), r.target.is_none()))
        .collect();
    assert_eq!(names, vec![("Missing", true), ("ghost", true)]);
    assert_eq!(program.metadata.lines[0].references.len(), 1);
    assert_eq!(program.metadata.lines[2].references.len(), 1);
}

#[test]
fn level_jump_is_a_warning() {
    let program = compile("# A\n### C\n");
    assert_eq!(program.diagnostics.len(), 1);
    assert_eq!(program.diagnostics[0].severity, Severity::Warning);
    assert!(!program.has_errors());

    let quiet = compile_script(
        "# A\n### C\n",
        &LiteralCallbacks::new(),
        &CompileOptions {
            warn_on_level_jump: false,
            ..CompileOptions::default()
        },
    );
    assert!(quiet.diagnostics.is_empty());
}

#[test]
fn configured_keywords_are_reserved() {
    let mut config = sparkdown_config::Config::default();
    config.compiler.reserved_keywords = vec!["vault".to_string()];
    let program = compile_script(
        "# vault\n",
        &LiteralCallbacks::new(),
        &CompileOptions::from(&config),
    );
    assert_eq!(messages(&program), vec!["'vault' is a reserved keyword"]);
}

#[test]
fn imports_resolve_against_the_configured_asset_root() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("theme.txt"), "la la").unwrap();
    let mut config = sparkdown_config::Config::default();
    config.project.asset_root = Some(dir.path().to_path_buf());

    let program = compile_script(
        "import audio.theme from 'theme.txt'\n\nMusic plays. [[theme]]\n",
        &LiteralCallbacks::from(&config),
        &CompileOptions::from(&config),
    );
    assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);
    assert_eq!(
        program.value("audio", "theme"),
        Some(&json!({"src": "theme.txt", "data": "la la"}))
    );
    assert_eq!(
        program.metadata.references[0].target.as_deref(),
        Some("audio.theme")
    );
}

#[test]
fn outline_and_scene_metadata() {
    let program = compile("# Act\nINT. HALL - DAY\n\nAnn: Go.\n\nEXT. YARD - NIGHT\n");
    let act = &program.metadata.outline[0];
    assert_eq!((act.kind, act.name.as_str()), (OutlineKind::Section, "Act"));
    let scenes: Vec<_> = act.children.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(scenes, vec!["INT. HALL - DAY", "EXT. YARD - NIGHT"]);
    assert!(program.metadata.scenes[0].duration > 0.0);
    assert_eq!(program.metadata.scenes[1].duration, 0.0);
}

#[test]
fn program_serializes_to_json() {
    let program = compile("# Start\nJohn: Hello.\n");
    let json = program.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["tokens"][0]["type"], "dialogue");
    assert_eq!(value["tokens"][0]["section"], "Start");
    assert_eq!(value["variables"]["character.john"]["type"], "character");
}

#[test]
fn token_stream() {
    let program = compile(
        "define gold = 0

# Vault
INT. VAULT - NIGHT

Mara:
(whispering)
Quiet now.

+ Crack it -> Open
* Leave
  ~ gold += 1
  -> Out

## Open
CUT TO:

## Out
The end. ^fin
",
    );
    assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);
    insta::assert_snapshot!(dump_tokens(&program), @r#"
    3 [Vault] scene "INT. VAULT - NIGHT" Vault.0
    5 [Vault] dialogue mara x2 Vault.1
    9 [Vault] choice "Crack it" once=false -> Some("Vault.Open") -
    10 [Vault] choice "Leave" once=true -> None -
    11 [Vault] assign gold += 1 -
    12 [Vault] jump Vault.Out -
    15 [Vault.Open] transition "CUT TO:" Vault.Open.0
    18 [Vault.Out] action "The end." Vault.Out.fin
    "#);
}
