//! Extension tables: which files are processed, what language they are, and
//! how they are shown in the output tree.

use std::path::Path;

/// Supported extensions (lowercase, no dot) and the language reported for them.
const LANGUAGES: &[(&str, &str)] = &[
    ("py", "python"),
    ("pyx", "python"),
    ("pyi", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("html", "html"),
    ("htm", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("sass", "sass"),
    ("less", "less"),
    ("java", "java"),
    ("scala", "scala"),
    ("kt", "kotlin"),
    ("groovy", "groovy"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cxx", "cpp"),
    ("cc", "cpp"),
    ("hpp", "cpp"),
    ("hxx", "cpp"),
    ("cs", "csharp"),
    ("vb", "visual-basic"),
    ("go", "go"),
    ("rs", "rust"),
    ("zig", "zig"),
    ("swift", "swift"),
    ("m", "objective-c"),
    ("mm", "objective-c"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("zsh", "shell"),
    ("fish", "fish"),
    ("ps1", "powershell"),
    ("bat", "batch"),
    ("cmd", "batch"),
    ("sql", "sql"),
    ("r", "r"),
    ("matlab", "matlab"),
    ("php", "php"),
    ("rb", "ruby"),
    ("pl", "perl"),
    ("lua", "lua"),
    ("dart", "dart"),
    ("elm", "elm"),
];

const ICONS: &[(&str, &str)] = &[
    ("py", "🐍"), ("pyx", "🐍"), ("pyi", "🐍"),
    ("js", "🟨"), ("mjs", "🟨"), ("cjs", "🟨"),
    ("jsx", "⚛️"), ("tsx", "⚛️"), ("ts", "🔷"),
    ("html", "🌐"), ("htm", "🌐"),
    ("css", "🎨"), ("scss", "🎨"), ("sass", "🎨"), ("less", "🎨"),
    ("json", "📋"), ("h", "📋"), ("hpp", "📋"), ("hxx", "📋"),
    ("md", "📝"), ("markdown", "📝"),
    ("yml", "⚙️"), ("yaml", "⚙️"), ("toml", "⚙️"), ("ini", "⚙️"),
    ("c", "⚙️"), ("cpp", "⚙️"), ("cxx", "⚙️"), ("cc", "⚙️"),
    ("xml", "📰"),
    ("sql", "🗃️"),
    ("java", "☕"), ("scala", "🔺"), ("kt", "🟢"), ("groovy", "🐘"),
    ("cs", "🔹"), ("vb", "🔹"),
    ("go", "🐹"), ("rs", "🦀"), ("zig", "⚡"),
    ("php", "🐘"), ("rb", "💎"), ("pl", "🐪"), ("lua", "🌙"),
    ("swift", "🍎"), ("m", "🍎"), ("mm", "🍎"),
    ("dart", "🎯"), ("elm", "🌳"),
    ("r", "📊"), ("matlab", "📊"),
    ("sh", "🐚"), ("bash", "🐚"), ("zsh", "🐚"), ("fish", "🐠"),
    ("ps1", "💙"), ("bat", "⚫"), ("cmd", "⚫"),
];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Language for a path, or `None` when the extension is not supported.
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = extension_of(path)?;
    LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, language)| *language)
}

/// Supported extensions with a leading dot, in table order.
pub fn supported_extensions() -> Vec<String> {
    LANGUAGES.iter().map(|(ext, _)| format!(".{}", ext)).collect()
}

pub fn is_supported(path: &Path) -> bool {
    detect_language(path).is_some()
}

pub fn icon_for(path: &Path) -> &'static str {
    extension_of(path)
        .and_then(|ext| ICONS.iter().find(|(candidate, _)| *candidate == ext))
        .map(|(_, icon)| *icon)
        .unwrap_or("📄")
}
