//! Grammar rules: the core recognizer table and the screenplay extension.
//!
//! - [`block`]: block recognizers and the skip-markup handlers of composites
//! - [`leaf`]: the dialogue leaf parser
//! - [`inline`]: inline scanning and delimiter resolution
//! - [`statement`]: token-level structure of logic lines

use std::collections::HashMap;

pub mod block;
pub mod inline;
pub mod leaf;
pub mod statement;

use super::registry::{Placement, Registry};
use super::{Extension, ParserConfig, SkipMarkupFn};
use crate::syntax_kind::SyntaxKind;

/// Front matter, chunks, sections, quotes, choices and inline delimiters.
pub(crate) fn core_config() -> ParserConfig {
    let mut block_parsers = Registry::new();
    block_parsers.push("FrontMatter", block::front_matter as super::BlockParseFn);
    block_parsers.push("Chunk", block::chunk);
    block_parsers.push("Section", block::section);
    block_parsers.push("BlockQuote", block::block_quote);
    block_parsers.push("ChoiceList", block::choice_list);

    let mut end_leaf = Registry::new();
    end_leaf.push("Chunk", block::ends_with_chunk as super::EndLeafFn);
    end_leaf.push("Section", block::ends_with_section);
    end_leaf.push("BlockQuote", block::ends_with_block_quote);
    end_leaf.push("ChoiceList", block::ends_with_choice);

    let mut inline_parsers = Registry::new();
    inline_parsers.push("Escape", inline::escape as super::InlineParseFn);
    inline_parsers.push("Note", inline::note);
    inline_parsers.push("Interpolation", inline::interpolation);
    inline_parsers.push("Emphasis", inline::emphasis);
    inline_parsers.push("Underline", inline::underline);

    let skip_markup: HashMap<SyntaxKind, SkipMarkupFn> = [
        (SyntaxKind::DOCUMENT, block::skip_document as SkipMarkupFn),
        (SyntaxKind::CHUNK, block::skip_chunk),
        (SyntaxKind::SECTION, block::skip_section),
        (SyntaxKind::BLOCK_QUOTE, block::skip_block_quote),
        (SyntaxKind::CHOICE_LIST, block::skip_choice_list),
        (SyntaxKind::CHOICE, block::skip_choice),
    ]
    .into_iter()
    .collect();

    ParserConfig {
        block_parsers,
        leaf_parsers: Registry::new(),
        end_leaf,
        inline_parsers,
        skip_markup,
    }
}

/// Scenes, transitions, definitions, imports, logic, jumps, checkpoints,
/// dialogue, asset tags and diverts.
pub fn script_extension() -> Extension {
    Extension {
        block_parsers: vec![
            (Placement::Before("BlockQuote"), "Define", block::define as _),
            (Placement::After("Define"), "Import", block::import as _),
            (Placement::After("Import"), "Logic", block::logic as _),
            (Placement::After("Logic"), "Jump", block::jump as _),
            (Placement::After("Jump"), "CheckpointLine", block::checkpoint as _),
            (Placement::End, "Scene", block::scene as _),
            (Placement::End, "Transition", block::transition as _),
        ],
        leaf_parsers: vec![(Placement::End, "Dialogue", leaf::dialogue as _)],
        end_leaf: vec![
            (Placement::End, "Define", block::ends_with_define as _),
            (Placement::End, "Import", block::ends_with_import as _),
            (Placement::End, "Logic", block::ends_with_logic as _),
            (Placement::End, "Jump", block::ends_with_jump as _),
            (Placement::End, "CheckpointLine", block::ends_with_checkpoint as _),
            (Placement::End, "Scene", block::ends_with_scene as _),
            (Placement::End, "Transition", block::ends_with_transition as _),
            (Placement::End, "Dialogue", leaf::ends_with_dialogue as _),
        ],
        inline_parsers: vec![
            (Placement::Before("Note"), "AssetTag", inline::asset_tag as _),
            (Placement::After("AssetTag"), "Divert", inline::divert as _),
            (Placement::End, "Checkpoint", inline::checkpoint as _),
        ],
        skip_markup: Vec::new(),
        remove: Vec::new(),
    }
}
