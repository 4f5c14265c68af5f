//! Text normalization and similarity tests used when pairing ja/en items.

use std::collections::BTreeSet;

/// Containment only counts when the shorter side has at least this many
/// characters; short strings like "WGS" are contained in too much.
pub const MIN_CONTAINMENT_CHARS: usize = 8;

pub const MIN_WORD_OVERLAP: f64 = 0.5;

/// Canonical keyword and the spellings that map to it, in either language.
const KEYWORDS: &[(&str, &[&str])] = &[
    ("wgs", &["wgs", "whole genome", "whole-genome", "全ゲノム"]),
    ("exome", &["exome", "wes", "エクソーム", "エキソーム"]),
    ("rna-seq", &["rna-seq", "rnaseq", "transcriptome", "トランスクリプトーム"]),
    ("snp-array", &["snp array", "snp-array", "snp chip", "genotyping array", "snpアレイ"]),
    ("gwas", &["gwas", "genome-wide association", "ゲノムワイド関連"]),
    ("methylation", &["methylation", "メチル化"]),
    ("chip-seq", &["chip-seq", "chipseq"]),
    ("atac-seq", &["atac-seq", "atacseq"]),
    ("hla", &["hla"]),
    ("single-cell", &["single-cell", "single cell", "scrna-seq", "シングルセル", "1細胞"]),
    ("target-capture", &["target capture", "targeted sequencing", "ターゲットキャプチャー", "標的"]),
    ("metagenome", &["metagenome", "16s", "メタゲノム"]),
    ("cnv", &["cnv", "copy number", "コピー数"]),
    ("long-read", &["long-read", "long read", "nanopore", "pacbio", "ロングリード"]),
    ("proteome", &["proteome", "proteomics", "プロテオーム"]),
    ("metabolome", &["metabolome", "metabolomics", "メタボローム"]),
];

const OPEN_BRACKETS: &[char] = &['(', '[', '{', '<', '（', '［', '｛', '＜', '【', '「', '『', '〔', '〈', '《'];
const CLOSE_BRACKETS: &[char] = &[')', ']', '}', '>', '）', '］', '｝', '＞', '】', '」', '』', '〕', '〉', '》'];

/// Lowercases, folds full-width ASCII, turns every bracket variant into
/// `(`/`)` and collapses whitespace.
pub fn normalize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        let ch = fold_full_width(ch);
        if OPEN_BRACKETS.contains(&ch) {
            out.push_str(" ( ");
        } else if CLOSE_BRACKETS.contains(&ch) {
            out.push_str(" ) ");
        } else if ch.is_whitespace() || ch == '\u{3000}' {
            out.push(' ');
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_full_width(ch: char) -> char {
    match ch {
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch),
        _ => ch,
    }
}

pub fn keywords(normalized: &str) -> BTreeSet<&'static str> {
    let tokens = words(normalized);
    KEYWORDS
        .iter()
        .filter(|(_, spellings)| {
            spellings.iter().any(|spelling| {
                // abbreviations must be whole words ("wes" is not "western")
                if spelling.len() <= 3 && spelling.is_ascii() {
                    tokens.contains(spelling)
                } else {
                    normalized.contains(spelling)
                }
            })
        })
        .map(|(canonical, _)| *canonical)
        .collect()
}

pub fn words(normalized: &str) -> BTreeSet<&str> {
    normalized
        .split(|ch: char| !ch.is_alphanumeric() && ch != '-')
        .filter(|word| !word.is_empty())
        .collect()
}

/// Share of distinct words two texts have in common, relative to the larger
/// word set.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let wa = words(a);
    let wb = words(b);
    let larger = wa.len().max(wb.len());
    if larger == 0 {
        return 0.0;
    }
    wa.intersection(&wb).count() as f64 / larger as f64
}

fn contains_either(a: &str, b: &str) -> bool {
    let shorter = a.chars().count().min(b.chars().count());
    shorter >= MIN_CONTAINMENT_CHARS && (a.contains(b) || b.contains(a))
}

/// Experiment header similarity: equality, then containment, then shared
/// vocabulary keywords.
pub fn headers_similar(a: &str, b: &str) -> bool {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    if na == nb || contains_either(&na, &nb) {
        return true;
    }
    let ka = keywords(&na);
    !ka.is_empty() && !ka.is_disjoint(&keywords(&nb))
}

/// Title similarity: equality, containment, or enough shared words.
pub fn titles_similar(a: &str, b: &str) -> bool {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    na == nb || contains_either(&na, &nb) || word_overlap(&na, &nb) >= MIN_WORD_OVERLAP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_brackets_and_width() {
        assert_eq!(normalize("ＷＧＳ（Ｉｌｌｕｍｉｎａ）"), "wgs ( illumina )");
        assert_eq!(normalize("WGS (Illumina)"), "wgs ( illumina )");
        assert_eq!(normalize("  a \t b  "), "a b");
    }

    #[test]
    fn short_strings_do_not_match_by_containment() {
        assert!(!headers_similar("NGS", "NGS data of tumour samples"));
        assert!(headers_similar("tumour samples", "NGS data of tumour samples"));
    }

    #[test]
    fn keywords_bridge_languages() {
        assert!(headers_similar("エクソーム解析", "Exome analysis"));
        assert!(!headers_similar("メチル化解析", "Exome analysis"));
    }

    #[test]
    fn titles_match_on_word_overlap() {
        assert!(titles_similar(
            "Genome-wide association study of type 2 diabetes",
            "Genome-wide association study of type 2 diabetes in Japanese"
        ));
        assert!(titles_similar(
            "Whole genome sequencing of gastric cancer",
            "Whole genome sequencing of colorectal cancer"
        ));
        assert!(!titles_similar("Lung cancer cohort", "Sleep disorder GWAS"));
    }
}
