use crate::error::{RenderError, Result};
use crate::primitives::FontRequest;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

/// Family used when nothing else resolves: a generic sans-serif.
const GENERIC_FAMILY: &str = "sans-serif";
const FONT_DIR_ENV: &str = "PAGETIFF_FONT_DIR";
const MAX_SCAN_DEPTH: usize = 5;

/// One font program and the style it was designed for.
#[derive(Debug)]
pub struct FontFace {
    pub family: String,
    pub data: Vec<u8>,
    pub bold: bool,
    pub italic: bool,
}

/// A face chosen for a request, plus what must be synthesized on top of it.
#[derive(Debug, Clone)]
pub struct ResolvedFont {
    pub face: Arc<FontFace>,
    pub synthetic_bold: bool,
    pub synthetic_italic: bool,
    /// True when the requested family was unavailable.
    pub substituted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StyleVariant {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl StyleVariant {
    fn new(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (true, true) => StyleVariant::BoldItalic,
            (true, false) => StyleVariant::Bold,
            (false, true) => StyleVariant::Italic,
            (false, false) => StyleVariant::Regular,
        }
    }

    fn slot(self) -> usize {
        match self {
            StyleVariant::Regular => 0,
            StyleVariant::Bold => 1,
            StyleVariant::Italic => 2,
            StyleVariant::BoldItalic => 3,
        }
    }

    /// Closest substitutes first; slant is kept before weight.
    fn fallback_order(self) -> [StyleVariant; 4] {
        use StyleVariant::*;
        match self {
            Regular => [Regular, Bold, Italic, BoldItalic],
            Bold => [Bold, Regular, BoldItalic, Italic],
            Italic => [Italic, Regular, BoldItalic, Bold],
            BoldItalic => [BoldItalic, Bold, Italic, Regular],
        }
    }
}

pub struct FontRegistry {
    fonts: Vec<Arc<FontFace>>,
    lookup: HashMap<String, Vec<usize>>,
    search_dirs: Vec<PathBuf>,
    system_index: OnceLock<BTreeMap<String, PathBuf>>,
    system_cache: Mutex<HashMap<PathBuf, Option<Arc<FontFace>>>>,
    warned: Mutex<HashSet<String>>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            search_dirs: Vec::new(),
            system_index: OnceLock::new(),
            system_cache: Mutex::new(HashMap::new()),
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Adds a directory scanned (recursively) for system fallback fonts.
    pub fn add_search_dir(&mut self, path: impl Into<PathBuf>) {
        self.search_dirs.push(path.into());
    }

    pub fn register_dir(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(path.as_ref())?.flatten() {
            let path = entry.path();
            if path.is_file() && is_font_file(&path) && self.register_file(&path).is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        self.register_bytes(data, path.file_stem().and_then(|v| v.to_str()))
    }

    /// Registers an in-memory font program; returns its family name.
    pub fn register_bytes(&mut self, data: Vec<u8>, source_name: Option<&str>) -> Result<String> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let (face, aliases) = parse_face(data, source).ok_or_else(|| {
            RenderError::InvalidConfiguration(format!("invalid font data for {source}"))
        })?;
        let family = face.family.clone();
        let index = self.fonts.len();
        self.fonts.push(Arc::new(face));
        for alias in aliases {
            let key = normalize_name(&alias);
            if key.is_empty() {
                continue;
            }
            let slot = self.lookup.entry(key).or_default();
            if !slot.contains(&index) {
                slot.push(index);
            }
        }
        debug!("registered font family '{family}' from {source}");
        Ok(family)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// Resolves `request`, substituting `default_family` (and then a generic
    /// sans-serif face) when the requested family is unknown. Returns `None`
    /// only when the host has no usable font at all.
    pub fn resolve(&self, request: &FontRequest, default_family: &str) -> Option<ResolvedFont> {
        let style = StyleVariant::new(request.bold, request.italic);
        let chains = [
            (request.family.as_str(), false),
            (default_family, true),
            (GENERIC_FAMILY, true),
        ];
        for (families, substituted) in chains {
            for family in split_families(families) {
                let face = self
                    .registered_face(&family, style)
                    .or_else(|| self.system_face(&family, style));
                if let Some(face) = face {
                    if substituted {
                        self.warn_once(&request.family, &face.family);
                    }
                    return Some(finish(face, request, substituted));
                }
            }
        }

        let last_resort = self
            .fonts
            .first()
            .cloned()
            .or_else(|| self.any_system_face());
        match last_resort {
            Some(face) => {
                self.warn_once(&request.family, &face.family);
                Some(finish(face, request, true))
            }
            None => {
                self.warn_once(&request.family, "");
                None
            }
        }
    }

    fn registered_face(&self, family: &str, style: StyleVariant) -> Option<Arc<FontFace>> {
        let indices = self.lookup.get(&normalize_name(family))?;
        let faces = indices.iter().filter_map(|i| self.fonts.get(*i));
        faces
            .max_by_key(|face| style_score(face, style))
            .cloned()
    }

    fn system_face(&self, family: &str, style: StyleVariant) -> Option<Arc<FontFace>> {
        let index = self.system_index();
        for candidate in system_font_file_candidates(family, style) {
            let Some(path) = index.get(&candidate.to_ascii_lowercase()) else {
                continue;
            };
            if let Some(face) = self.load_system_face(path) {
                return Some(face);
            }
        }
        None
    }

    fn any_system_face(&self) -> Option<Arc<FontFace>> {
        self.system_index()
            .values()
            .find_map(|path| self.load_system_face(path))
    }

    fn load_system_face(&self, path: &Path) -> Option<Arc<FontFace>> {
        if let Ok(cache) = self.system_cache.lock() {
            if let Some(entry) = cache.get(path) {
                return entry.clone();
            }
        }
        let stem = path.file_stem().and_then(|v| v.to_str()).unwrap_or("SystemFont");
        let loaded = fs::read(path)
            .ok()
            .and_then(|data| parse_face(data, stem))
            .map(|(face, _)| Arc::new(face));
        if let Ok(mut cache) = self.system_cache.lock() {
            cache.insert(path.to_path_buf(), loaded.clone());
        }
        loaded
    }

    fn system_index(&self) -> &BTreeMap<String, PathBuf> {
        self.system_index.get_or_init(|| {
            let mut dirs = system_font_dirs();
            dirs.extend(self.search_dirs.iter().cloned());
            let mut index = BTreeMap::new();
            for dir in dirs {
                scan_font_dir(&dir, 0, &mut index);
            }
            debug!("indexed {} system font files", index.len());
            index
        })
    }

    fn warn_once(&self, requested: &str, used: &str) {
        let Ok(mut warned) = self.warned.lock() else {
            return;
        };
        if !warned.insert(normalize_name(requested)) {
            return;
        }
        if used.is_empty() {
            warn!("no font available for family '{requested}'; text will not be drawn");
        } else {
            warn!("font family '{requested}' unavailable; substituting '{used}'");
        }
    }
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn finish(face: Arc<FontFace>, request: &FontRequest, substituted: bool) -> ResolvedFont {
    ResolvedFont {
        synthetic_bold: request.bold && !face.bold,
        synthetic_italic: request.italic && !face.italic,
        face,
        substituted,
    }
}

fn style_score(face: &FontFace, style: StyleVariant) -> u8 {
    let (bold, italic) = match style {
        StyleVariant::Regular => (false, false),
        StyleVariant::Bold => (true, false),
        StyleVariant::Italic => (false, true),
        StyleVariant::BoldItalic => (true, true),
    };
    // Weight mismatches are cheaper to fake than slant mismatches.
    (u8::from(face.italic == italic) * 2) + u8::from(face.bold == bold)
}

fn parse_face(data: Vec<u8>, source: &str) -> Option<(FontFace, Vec<String>)> {
    use ttf_parser::name::name_id;

    let face = ttf_parser::Face::parse(&data, 0).ok()?;
    let mut family = None;
    let mut names = Vec::new();
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name.clone());
                }
                names.push(name);
            }
            name_id::FULL_NAME | name_id::POST_SCRIPT_NAME => names.push(name),
            _ => {}
        }
    }
    let family = family.unwrap_or_else(|| source.to_string());
    names.push(source.to_string());
    let bold = face.is_bold();
    let italic = face.is_italic() || face.is_oblique();
    drop(face);
    Some((
        FontFace {
            family,
            data,
            bold,
            italic,
        },
        names,
    ))
}

fn split_families(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().trim_matches('"').trim_matches('\'').trim())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

fn is_font_file(path: &Path) -> bool {
    path.extension()
        .and_then(|v| v.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf"))
        .unwrap_or(false)
}

fn scan_font_dir(dir: &Path, depth: usize, index: &mut BTreeMap<String, PathBuf>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_font_dir(&path, depth + 1, index);
        } else if is_font_file(&path) {
            if let Some(name) = path.file_name().and_then(|v| v.to_str()) {
                index.entry(name.to_ascii_lowercase()).or_insert(path);
            }
        }
    }
}

#[cfg(target_os = "windows")]
const PLATFORM_FONT_DIRS: &[&str] = &[r"C:\Windows\Fonts"];
#[cfg(target_os = "macos")]
const PLATFORM_FONT_DIRS: &[&str] = &["/System/Library/Fonts", "/Library/Fonts"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const PLATFORM_FONT_DIRS: &[&str] = &["/usr/share/fonts", "/usr/local/share/fonts"];

/// Per-user font folders, relative to `USER_ROOT_ENV`.
#[cfg(target_os = "windows")]
const USER_FONT_DIRS: &[&str] = &[r"Microsoft\Windows\Fonts"];
#[cfg(target_os = "macos")]
const USER_FONT_DIRS: &[&str] = &["Library/Fonts"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const USER_FONT_DIRS: &[&str] = &[".fonts", ".local/share/fonts"];

#[cfg(target_os = "windows")]
const USER_ROOT_ENV: &str = "LOCALAPPDATA";
#[cfg(not(target_os = "windows"))]
const USER_ROOT_ENV: &str = "HOME";

fn system_font_dirs() -> Vec<PathBuf> {
    font_search_roots(
        std::env::var_os(USER_ROOT_ENV),
        std::env::var_os(FONT_DIR_ENV),
    )
}

/// Platform folders, then per-user folders, then the `PAGETIFF_FONT_DIR`
/// path list.
fn font_search_roots(user_root: Option<OsString>, extra: Option<OsString>) -> Vec<PathBuf> {
    let platform = PLATFORM_FONT_DIRS.iter().map(PathBuf::from);
    let user = user_root
        .into_iter()
        .flat_map(|root| USER_FONT_DIRS.iter().map(move |dir| Path::new(&root).join(dir)));
    let extra: Vec<PathBuf> = extra
        .map(|list| std::env::split_paths(&list).collect())
        .unwrap_or_default();
    platform
        .chain(user)
        .chain(extra)
        .filter(|dir| !dir.as_os_str().is_empty())
        .collect()
}

/// Well-known file names per family group, indexed by
/// `StyleVariant::slot`: regular, bold, italic, bold italic.
struct KnownFamily {
    aliases: &'static [&'static str],
    files: [&'static [&'static str]; 4],
}

const KNOWN_FAMILIES: &[KnownFamily] = &[
    KnownFamily {
        aliases: &["sans-serif", "arial", "helvetica", "helvetica neue", "microsoft sans serif"],
        files: [
            &["arial.ttf", "LiberationSans-Regular.ttf", "DejaVuSans.ttf", "NotoSans-Regular.ttf", "FreeSans.ttf"],
            &["arialbd.ttf", "LiberationSans-Bold.ttf", "DejaVuSans-Bold.ttf", "NotoSans-Bold.ttf", "FreeSansBold.ttf"],
            &["ariali.ttf", "LiberationSans-Italic.ttf", "DejaVuSans-Oblique.ttf", "NotoSans-Italic.ttf", "FreeSansOblique.ttf"],
            &["arialbi.ttf", "LiberationSans-BoldItalic.ttf", "DejaVuSans-BoldOblique.ttf", "NotoSans-BoldItalic.ttf", "FreeSansBoldOblique.ttf"],
        ],
    },
    KnownFamily {
        aliases: &["serif", "times", "times roman", "times new roman"],
        files: [
            &["times.ttf", "LiberationSerif-Regular.ttf", "DejaVuSerif.ttf"],
            &["timesbd.ttf", "LiberationSerif-Bold.ttf", "DejaVuSerif-Bold.ttf"],
            &["timesi.ttf", "LiberationSerif-Italic.ttf", "DejaVuSerif-Italic.ttf"],
            &["timesbi.ttf", "LiberationSerif-BoldItalic.ttf", "DejaVuSerif-BoldItalic.ttf"],
        ],
    },
    KnownFamily {
        aliases: &["monospace", "courier", "courier new"],
        files: [
            &["cour.ttf", "LiberationMono-Regular.ttf", "DejaVuSansMono.ttf"],
            &["courbd.ttf", "LiberationMono-Bold.ttf", "DejaVuSansMono-Bold.ttf"],
            &["couri.ttf", "LiberationMono-Italic.ttf", "DejaVuSansMono-Oblique.ttf"],
            &["courbi.ttf", "LiberationMono-BoldItalic.ttf", "DejaVuSansMono-BoldOblique.ttf"],
        ],
    },
    KnownFamily {
        aliases: &["tahoma", "verdana"],
        files: [
            &["tahoma.ttf", "verdana.ttf", "DejaVuSans.ttf"],
            &["tahomabd.ttf", "verdanab.ttf", "DejaVuSans-Bold.ttf"],
            &["verdanai.ttf", "DejaVuSans-Oblique.ttf"],
            &["verdanaz.ttf", "DejaVuSans-BoldOblique.ttf"],
        ],
    },
];

fn push_unique(out: &mut Vec<String>, name: String) {
    if !out.iter().any(|existing| existing.eq_ignore_ascii_case(&name)) {
        out.push(name);
    }
}

/// File names worth trying for `family`, best match first: known files for
/// the family group in style fallback order, then names derived from the
/// family itself.
fn system_font_file_candidates(family: &str, style: StyleVariant) -> Vec<String> {
    let family = normalize_name(family);
    let mut out = Vec::new();
    if let Some(known) = KNOWN_FAMILIES
        .iter()
        .find(|known| known.aliases.contains(&family.as_str()))
    {
        for variant in style.fallback_order() {
            for name in known.files[variant.slot()] {
                push_unique(&mut out, (*name).to_string());
            }
        }
    }

    let stem = family.replace(' ', "");
    if stem.is_empty() {
        return out;
    }
    let suffixes: &[&str] = match style {
        StyleVariant::Regular => &["", "-Regular"],
        StyleVariant::Bold => &["-Bold", "bd"],
        StyleVariant::Italic => &["-Italic", "i"],
        StyleVariant::BoldItalic => &["-BoldItalic", "bi"],
    };
    for suffix in suffixes {
        push_unique(&mut out, format!("{stem}{suffix}.ttf"));
    }
    push_unique(&mut out, format!("{stem}.ttf"));
    push_unique(&mut out, format!("{stem}.otf"));
    out
}

#[cfg(test)]
pub(crate) const FIXTURE_FAMILY: &str = "DejaVu Sans";

/// A registry holding only the bundled test font.
#[cfg(test)]
pub(crate) fn fixture_fonts() -> FontRegistry {
    let mut registry = FontRegistry::new();
    let data = include_bytes!("../tests/fixtures/fonts/DejaVuSans.ttf").to_vec();
    let family = registry
        .register_bytes(data, Some("DejaVuSans"))
        .expect("bundled font parses");
    assert_eq!(family, FIXTURE_FAMILY);
    registry
}
