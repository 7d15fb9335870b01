use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use menubot_telegram::{MenuButton, MessageView, ParseMode};
use serde::{Deserialize, Serialize};

/// Selection id carried by the back-navigation button.
pub const HOME_SELECTION_ID: &str = "home";
/// Older clients may still hold keyboards that use this id for "back".
pub const LEGACY_HOME_SELECTION_ID: &str = "menu";
pub const INVALID_SELECTION_TEXT: &str = "Invalid selection.";
pub const DEFAULT_HOME_TEXT: &str = "Choose an item from the menu:";
pub const DEFAULT_BACK_LABEL: &str = "⬅ Back to Menu";
// Telegram caps callback data at 64 bytes.
const MAX_SELECTION_ID_BYTES: usize = 64;

fn default_home_text() -> String {
    DEFAULT_HOME_TEXT.to_string()
}

fn default_back_label() -> String {
    DEFAULT_BACK_LABEL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub label: String,
    pub body: String,
}

impl MenuItem {
    fn new(id: &str, label: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MenuCatalogFile {
    #[serde(default = "default_home_text")]
    home_text: String,
    #[serde(default = "default_back_label")]
    back_label: String,
    #[serde(default)]
    items: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable mapping from selection id to display text, plus the home view.
pub struct MenuCatalog {
    home_text: String,
    back_label: String,
    items: Vec<MenuItem>,
}

/// Returns true for ids that navigate back to the home view.
pub fn is_home_selection(selection_id: &str) -> bool {
    selection_id == HOME_SELECTION_ID || selection_id == LEGACY_HOME_SELECTION_ID
}

impl MenuCatalog {
    pub fn new(home_text: String, back_label: String, items: Vec<MenuItem>) -> Result<Self> {
        validate_items(&items)?;
        if home_text.trim().is_empty() {
            bail!("menu home_text cannot be empty");
        }
        if back_label.trim().is_empty() {
            bail!("menu back_label cannot be empty");
        }
        Ok(Self {
            home_text,
            back_label,
            items,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let parsed = toml::from_str::<MenuCatalogFile>(raw).context("failed to parse menu toml")?;
        Self::new(parsed.home_text, parsed.back_label, parsed.items)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read menu file {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid menu file {}", path.display()))
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn item(&self, id: &str) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn render_home(&self) -> MessageView {
        MessageView {
            text: self.home_text.clone(),
            buttons: self
                .items
                .iter()
                .map(|item| MenuButton::new(item.label.clone(), item.id.clone()))
                .collect(),
            parse_mode: None,
        }
    }

    pub fn render_item(&self, id: &str) -> MessageView {
        let text = self
            .item(id)
            .map(|item| item.body.clone())
            .unwrap_or_else(|| INVALID_SELECTION_TEXT.to_string());
        MessageView {
            text,
            buttons: vec![self.back_button()],
            parse_mode: Some(ParseMode::Markdown),
        }
    }

    fn back_button(&self) -> MenuButton {
        MenuButton::new(self.back_label.clone(), HOME_SELECTION_ID)
    }

    /// The eight-item manual the bot ships with.
    pub fn builtin() -> Self {
        Self {
            home_text: default_home_text(),
            back_label: default_back_label(),
            items: builtin_items(),
        }
    }
}

impl Default for MenuCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate_items(items: &[MenuItem]) -> Result<()> {
    if items.is_empty() {
        bail!("menu must define at least one item");
    }
    let mut seen = HashSet::new();
    for item in items {
        let id = item.id.trim();
        if id.is_empty() || id != item.id {
            bail!("menu item id '{}' must be non-empty without surrounding whitespace", item.id);
        }
        if id.len() > MAX_SELECTION_ID_BYTES {
            bail!("menu item id '{id}' exceeds {MAX_SELECTION_ID_BYTES} bytes");
        }
        if is_home_selection(id) {
            bail!("menu item id '{id}' is reserved for back navigation");
        }
        if item.label.trim().is_empty() {
            bail!("menu item '{id}' has an empty label");
        }
        if item.body.trim().is_empty() {
            bail!("menu item '{id}' has an empty body");
        }
        if !seen.insert(id) {
            bail!("duplicate menu item id '{id}'");
        }
    }
    Ok(())
}

fn builtin_items() -> Vec<MenuItem> {
    vec![
        MenuItem::new(
            "item1",
            "Minimum Force Level",
            "**Minimum Force Level (MFL)**\n\n\
             The MFL must always be maintained, and any changes to the MFL require approval from the Commanding Officer.\n\n\
             The Chief Operator may delegate tasks but remains responsible for the hunters' assignment. \
             The assignment must be recorded in the designated Ops manning record for accountability and monitoring.\n\n\
             **MFL Table:**\n\n\
             | Day         | Day (AM) Shift | Stagger (PM Shift) |\n\
             |--------------|----------------|--------------------|\n\
             | Weekday    | 7            | 6                |\n\
             | Weekend/PH | 8            | 6                |\n\
             | Flight     | +1           | +2               |\n\n\
             **If the MFL is not met, the Chief Operator/Deputy Chief Operator must inform:**\n\
             - CE (for Ops)\n\
             - Chief Expert (CX) (for manpower resourcing)\n\n\
             Details to be provided:\n\
             - Reason for the shortfall\n\
             - Personnel involved\n\
             - Current Ops situation\n\n\
             **Interim Mitigation Measures:**\n\
             - Reallocate assignments while awaiting late arrivals or activated personnel.\n\
             - CE/CX may retain personnel from the previous shift if required.",
        ),
        MenuItem::new(
            "item2",
            "PERSONNEL ACTIVATION",
            "**PERSONNEL ACTIVATION**\n\n\
             B Coy personnel may be recalled (activated) from Off-In-Lieu (OIL), OFF, and vacation leave to maintain the MFL caused by unforeseen events and to meet ad-hoc Ops exigencies.\n\n\
             **Activation Priority for Personnel**\n\n\
             1. OIL - Back to own shift on their default working day. Includes post-regimental duty rest/OIL.\n\
             2. Standby (Planned/Pre-arranged) - Last man recalled.\n\
             3. Working Personnel OFF Shift - Recalled on default working day to another shift.\n\
             4. OFF Shift - Recalled on default OFF day.\n\
             5. OFF Shift (if Priority 1-4 exhausted) - Recall personnel from OFF day.\n\
             6. Full Pay Unrecorded Leave (FPUL) - Recall with OC approval.\n\
             7. Vacation Leave (Local) - OC approval needed.\n\
             8. Vacation Leave (Overseas) - CO approval needed.\n\
             9. VIPER - At discretion of Chief Opr or CX.\n\n\
             **Reporting Time upon Activation:**\n\
             Personnel recalled must report to the OPS room within **2 hours** of activation.",
        ),
        MenuItem::new(
            "item3",
            "CONTACTABILITY",
            "**CONTACTABILITY**\n\n\
             All personnel must remain contactable at all times, particularly Standby personnel.\n\
             - Primary Standby personnel must respond before **0630hrs** (for Day shift activation) and **1230hrs** (for Stagger/VIPER shift activation).\n\
             - Personnel who are uncontactable upon activation will face disciplinary actions.\n\n\
             **Standby Activation Cut-off Time:**\n\
             - Default cut-off is **1200hrs**. CX may adjust based on operational needs while ensuring adequate work-rest cycles.",
        ),
        MenuItem::new(
            "item4",
            "ATTENDANCE AND ACCOUNTABILITY",
            "**ATTENDANCE AND ACCOUNTABILITY**\n\n\
             **Reporting Time:**\n\
             - Day Shift: 0745hrs\n\
             - Stagger Shift: 1445hrs\n\
             - VIPER Shift: 2145hrs\n\n\
             Late arrivals (Day: 0746hrs, Stagger: 1446hrs, VIPER: 2146hrs) will face disciplinary actions.\n\
             Failure to report for duty without official leave is a chargeable offense.",
        ),
        MenuItem::new(
            "item5",
            "LEAVE MANAGEMENT",
            "**LEAVE MANAGEMENT**\n\n\
             Personnel are encouraged to forecast and plan leave early.\n\
             - Leave is allocated on a **first-come-first-served basis**.\n\
             - The last person requesting leave (Last Man) will be recallable to maintain MFL.\n\
             - Alternatively, personnel may arrange for Standby coverage from the Off shift.",
        ),
        MenuItem::new("item6", "Item 6", "Details about Item 6..."),
        MenuItem::new("item7", "Item 7", "Details about Item 7..."),
        MenuItem::new("item8", "Item 8", "Details about Item 8..."),
    ]
}
