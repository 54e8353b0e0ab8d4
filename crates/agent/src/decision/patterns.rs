//! Phase 1: the weighted pattern scan.
//!
//! Pure and synchronous. Each family contributes its weight once when any
//! of its keywords or patterns match; the total is clamped to 100.
//! Keywords match whole words on an accent-folded, lowercased copy of the
//! message, so "Recuérdame" and "recuerdame" are the same word.

use super::classifier::ReminderIntent;
use orquesta_tools::names;
use regex_lite::Regex;

/// A weighted family of signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    PaymentKeyword,
    Amount,
    CommercialPhrase,
    ContactPattern,
    ContactKeyword,
    SchedulingStrong,
    SchedulingWeak,
    AnalyticsKeyword,
}

impl Family {
    pub const ALL: [Family; 8] = [
        Family::PaymentKeyword,
        Family::Amount,
        Family::CommercialPhrase,
        Family::ContactPattern,
        Family::ContactKeyword,
        Family::SchedulingStrong,
        Family::SchedulingWeak,
        Family::AnalyticsKeyword,
    ];

    pub fn weight(self) -> u8 {
        match self {
            Self::PaymentKeyword => 40,
            Self::Amount => 60,
            Self::CommercialPhrase => 30,
            Self::ContactPattern => 50,
            Self::ContactKeyword => 35,
            Self::SchedulingStrong => 20,
            Self::SchedulingWeak => 10,
            Self::AnalyticsKeyword => 30,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PaymentKeyword => "payment keyword",
            Self::Amount => "monetary amount",
            Self::CommercialPhrase => "commercial intent",
            Self::ContactPattern => "contact details",
            Self::ContactKeyword => "contact keyword",
            Self::SchedulingStrong => "scheduling keyword",
            Self::SchedulingWeak => "time reference",
            Self::AnalyticsKeyword => "analytics keyword",
        }
    }

    pub fn is_scheduling(self) -> bool {
        matches!(self, Self::SchedulingStrong | Self::SchedulingWeak)
    }

    /// The tool this family points at. Scheduling depends on the verb.
    fn tool(self) -> Option<&'static str> {
        match self {
            Self::PaymentKeyword | Self::Amount => Some(names::CREATE_PAYMENT_LINK),
            Self::CommercialPhrase | Self::ContactPattern | Self::ContactKeyword => {
                Some(names::SAVE_CONTACT_INFO)
            }
            Self::AnalyticsKeyword => Some(names::GET_CHATBOT_STATS),
            Self::SchedulingStrong | Self::SchedulingWeak => None,
        }
    }
}

const PAYMENT_KEYWORDS: &[&str] = &[
    "pago",
    "pagos",
    "pagar",
    "link de pago",
    "enlace de pago",
    "liga de pago",
    "cobrar",
    "cobro",
    "cobrame",
    "factura",
    "facturar",
    "tarjeta",
    "stripe",
    "payment",
    "pay",
    "checkout",
    "invoice",
];

const COMMERCIAL_PHRASES: &[&str] = &[
    "quiero comprar",
    "me interesa",
    "estoy interesado",
    "estoy interesada",
    "cotizacion",
    "cotizar",
    "precio",
    "precios",
    "cuanto cuesta",
    "cuanto sale",
    "cuanto vale",
    "costo",
    "contratar",
    "comprar",
    "adquirir",
    "how much",
    "pricing",
    "price",
    "quote",
    "buy",
    "purchase",
];

const CONTACT_KEYWORDS: &[&str] = &[
    "mi correo",
    "mi email",
    "mi mail",
    "mi telefono",
    "mi numero",
    "mi celular",
    "mi whatsapp",
    "contactame",
    "contactenme",
    "llamame",
    "escribeme",
    "mis datos",
    "my email",
    "my phone",
    "my number",
    "contact me",
    "call me",
];

const SCHEDULING_STRONG: &[&str] = &[
    "recordatorio",
    "recordatorios",
    "recuerdame",
    "recordar",
    "agendar",
    "agenda",
    "agendame",
    "programar",
    "cita",
    "citas",
    "reminder",
    "reminders",
    "remind",
    "schedule",
    "appointment",
];

const SCHEDULING_WEAK: &[&str] = &[
    "manana",
    "pasado manana",
    "hoy",
    "lunes",
    "martes",
    "miercoles",
    "jueves",
    "viernes",
    "sabado",
    "domingo",
    "a las",
    "fecha",
    "hora",
    "proxima semana",
    "semana que viene",
    "calendario",
    "tomorrow",
    "tonight",
    "next week",
    "calendar",
];

const ANALYTICS_KEYWORDS: &[&str] = &[
    "estadisticas",
    "estadistica",
    "metricas",
    "reporte",
    "reportes",
    "analiticas",
    "cuantas conversaciones",
    "cuantos mensajes",
    "cuantos leads",
    "leads",
    "analytics",
    "stats",
    "statistics",
    "metrics",
];

const CANCEL_VERBS: &[&str] = &[
    "cancela", "cancelar", "cancelalo", "cancelala", "elimina", "eliminar", "borra", "borrar",
    "quita", "quitar", "anula", "cancel", "delete", "remove",
];

const UPDATE_VERBS: &[&str] = &[
    "cambia",
    "cambiar",
    "mueve",
    "mover",
    "reprograma",
    "reprogramar",
    "modifica",
    "modificar",
    "actualiza",
    "actualizar",
    "pospon",
    "posponer",
    "reschedule",
    "update",
    "change",
    "move",
    "postpone",
];

const LIST_VERBS: &[&str] = &[
    "cuales",
    "lista",
    "listar",
    "muestrame",
    "mostrar",
    "ver",
    "tengo",
    "pendientes",
    "mis recordatorios",
    "mis citas",
    "show",
    "list",
    "view",
];

/// Lowercase and fold Spanish accents.
pub fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Split normalized text into words, dropping punctuation.
pub(crate) fn words(normalized: &str) -> Vec<&str> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whole-word (or whole-phrase) match against pre-split words.
pub(crate) fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    !needle.is_empty() && words.windows(needle.len()).any(|w| w == needle.as_slice())
}

fn any_phrase(words: &[&str], phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(words, p))
}

/// Which reminder operation the wording asks for. Creation is the default.
pub fn keyword_reminder_intent(message: &str) -> ReminderIntent {
    let normalized = normalize(message);
    let words = words(&normalized);
    if any_phrase(&words, CANCEL_VERBS) {
        ReminderIntent::Cancel
    } else if any_phrase(&words, UPDATE_VERBS) {
        ReminderIntent::Update
    } else if any_phrase(&words, LIST_VERBS) {
        ReminderIntent::List
    } else {
        ReminderIntent::Create
    }
}

/// The outcome of a phase-1 scan.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternScan {
    /// 0..=100
    pub confidence: u8,
    /// Matched families in scan order
    pub families: Vec<Family>,
    /// Tools implied by the families, de-duplicated, in family order
    pub suggested_tools: Vec<String>,
    /// Reminder operation, when a scheduling family matched
    pub reminder_intent: Option<ReminderIntent>,
}

impl PatternScan {
    pub fn matched(&self, family: Family) -> bool {
        self.families.contains(&family)
    }

    pub fn mentions_scheduling(&self) -> bool {
        self.families.iter().any(|f| f.is_scheduling())
    }

    /// Swap the suggested reminder tool for the one matching `intent`.
    pub fn set_reminder_intent(&mut self, intent: ReminderIntent) {
        let Some(previous) = self.reminder_intent.replace(intent) else {
            return;
        };
        let replacement = intent.tool_name().to_string();
        if let Some(slot) = self
            .suggested_tools
            .iter_mut()
            .find(|t| t.as_str() == previous.tool_name())
        {
            *slot = replacement;
        }
        dedup_in_order(&mut self.suggested_tools);
    }

    /// One line per matched family, for reasoning traces.
    pub fn describe(&self) -> Vec<String> {
        self.families
            .iter()
            .map(|f| format!("{} +{}", f.label(), f.weight()))
            .collect()
    }
}

fn dedup_in_order(tools: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    tools.retain(|t| seen.insert(t.clone()));
}

/// Compiled pattern families.
///
/// Built once at startup and shared; scanning allocates only the
/// normalized copy of the message.
#[derive(Debug, Clone)]
pub struct PatternScanner {
    amount: Regex,
    email: Regex,
    phone: Regex,
    date_or_time: Regex,
    iso_date: Regex,
    clock: Regex,
}

impl PatternScanner {
    pub fn new() -> Result<Self, regex_lite::Error> {
        Ok(Self {
            amount: Regex::new(
                r"\$\s?\d[\d,]*(?:\.\d+)?|\b\d[\d,]*(?:\.\d+)?\s?(?:mxn|usd|eur|pesos|dolares|dollars|euros)\b",
            )?,
            email: Regex::new(r"[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}")?,
            phone: Regex::new(r"\+?\d[\d\s().-]{6,}\d")?,
            date_or_time: Regex::new(r"\d{4}-\d{1,2}-\d{1,2}|\d{1,2}/\d{1,2}/\d{2,4}|\d{1,2}:\d{2}")?,
            iso_date: Regex::new(r"\b\d{4}-\d{2}-\d{2}\b")?,
            clock: Regex::new(r"\b(?:[01]?\d|2[0-3]):[0-5]\d\b")?,
        })
    }

    /// Score a message against every family.
    pub fn scan(&self, message: &str) -> PatternScan {
        let normalized = normalize(message);
        let words = words(&normalized);

        let families: Vec<Family> = Family::ALL
            .into_iter()
            .filter(|&family| self.family_matches(family, &normalized, &words))
            .collect();

        let total: u32 = families.iter().map(|f| u32::from(f.weight())).sum();
        let reminder_intent = families
            .iter()
            .any(|f| f.is_scheduling())
            .then(|| keyword_reminder_intent(message));

        let mut suggested_tools: Vec<String> = families
            .iter()
            .filter_map(|f| match f.tool() {
                Some(tool) => Some(tool.to_string()),
                None => reminder_intent.map(|i| i.tool_name().to_string()),
            })
            .collect();
        dedup_in_order(&mut suggested_tools);

        PatternScan {
            confidence: total.min(100) as u8,
            families,
            suggested_tools,
            reminder_intent,
        }
    }

    fn family_matches(&self, family: Family, normalized: &str, words: &[&str]) -> bool {
        match family {
            Family::PaymentKeyword => any_phrase(words, PAYMENT_KEYWORDS),
            Family::Amount => self.amount.is_match(normalized),
            Family::CommercialPhrase => any_phrase(words, COMMERCIAL_PHRASES),
            Family::ContactPattern => {
                self.email.is_match(normalized) || self.find_phone(normalized).is_some()
            }
            Family::ContactKeyword => any_phrase(words, CONTACT_KEYWORDS),
            Family::SchedulingStrong => any_phrase(words, SCHEDULING_STRONG),
            Family::SchedulingWeak => any_phrase(words, SCHEDULING_WEAK),
            Family::AnalyticsKeyword => any_phrase(words, ANALYTICS_KEYWORDS),
        }
    }

    /// The first monetary amount in the message, e.g. 1250.5 for "$1,250.50".
    pub fn extract_amount(&self, message: &str) -> Option<f64> {
        let normalized = normalize(message);
        let found = self.amount.find(&normalized)?;
        let digits: String = found
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        digits.parse::<f64>().ok().filter(|v| *v > 0.0)
    }

    pub fn extract_email(&self, message: &str) -> Option<String> {
        self.email
            .find(&message.to_lowercase())
            .map(|m| m.as_str().to_string())
    }

    pub fn extract_phone(&self, message: &str) -> Option<String> {
        self.find_phone(&normalize(message))
    }

    /// The first ISO date (YYYY-MM-DD) in the message.
    pub fn extract_date(&self, message: &str) -> Option<String> {
        self.iso_date.find(message).map(|m| m.as_str().to_string())
    }

    /// The first HH:MM time in the message, zero-padded.
    pub fn extract_time(&self, message: &str) -> Option<String> {
        let found = self.clock.find(message)?.as_str();
        let (hours, minutes) = found.split_once(':')?;
        Some(format!("{hours:0>2}:{minutes}"))
    }

    fn find_phone(&self, normalized: &str) -> Option<String> {
        let without_dates = self.date_or_time.replace_all(normalized, " ");
        self.phone
            .find_iter(&without_dates)
            .map(|m| m.as_str().trim().to_string())
            .find(|candidate| {
                let digits = candidate.chars().filter(char::is_ascii_digit).count();
                (10..=15).contains(&digits)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> PatternScanner {
        PatternScanner::new().unwrap()
    }

    #[test]
    fn payment_request_scores_high() {
        let scan = scanner().scan("Genera un link de pago por $500");
        assert!(scan.matched(Family::PaymentKeyword));
        assert!(scan.matched(Family::Amount));
        assert_eq!(scan.confidence, 100);
        assert_eq!(scan.suggested_tools, vec![names::CREATE_PAYMENT_LINK]);
    }

    #[test]
    fn small_talk_scores_zero() {
        let scan = scanner().scan("¿Cómo estás?");
        assert_eq!(scan.confidence, 0);
        assert!(scan.families.is_empty());
        assert!(scan.suggested_tools.is_empty());
        assert!(scan.reminder_intent.is_none());
    }

    #[test]
    fn keywords_match_whole_words_only() {
        // "ahora" contains "hora"
        let scan = scanner().scan("ahora mismo te respondo");
        assert!(!scan.matched(Family::SchedulingWeak));
        let scan = scanner().scan("¿Qué hora es?");
        assert!(scan.matched(Family::SchedulingWeak));
        assert_eq!(scan.confidence, 10);
    }

    #[test]
    fn accents_are_folded() {
        let scan = scanner().scan("Recuérdame la cita del miércoles");
        assert!(scan.matched(Family::SchedulingStrong));
        assert!(scan.matched(Family::SchedulingWeak));
        assert_eq!(scan.confidence, 30);
        assert_eq!(scan.reminder_intent, Some(ReminderIntent::Create));
        assert_eq!(scan.suggested_tools, vec![names::SCHEDULE_REMINDER]);
    }

    #[test]
    fn each_family_counts_once() {
        let scan = scanner().scan("pago pago pagar cobrar factura");
        assert_eq!(scan.families, vec![Family::PaymentKeyword]);
        assert_eq!(scan.confidence, 40);
    }

    #[test]
    fn confidence_is_monotonic_and_clamped() {
        let scanner = scanner();
        let mut message = String::from("hola");
        let mut previous = scanner.scan(&message).confidence;
        for addition in [
            " quiero pagar",
            " $1,200",
            " me interesa",
            " mi correo es ana@example.com",
            " agenda una cita mañana",
            " y dame estadísticas",
        ] {
            message.push_str(addition);
            let current = scanner.scan(&message).confidence;
            assert!(current >= previous, "{message}: {current} < {previous}");
            assert!(current <= 100);
            previous = current;
        }
        assert_eq!(previous, 100);
    }

    #[test]
    fn contact_details_detected() {
        let scanner = scanner();
        let scan = scanner.scan("Soy Ana, ana.lopez@Example.com");
        assert!(scan.matched(Family::ContactPattern));
        assert_eq!(scan.suggested_tools, vec![names::SAVE_CONTACT_INFO]);

        let scan = scanner.scan("llámame al +52 55 1234 5678");
        assert!(scan.matched(Family::ContactPattern));
        assert!(scan.matched(Family::ContactKeyword));
        assert_eq!(scan.confidence, 85);
        assert_eq!(
            scanner.extract_phone("llámame al +52 55 1234 5678").as_deref(),
            Some("+52 55 1234 5678")
        );
    }

    #[test]
    fn dates_are_not_phone_numbers() {
        let scanner = scanner();
        let scan = scanner.scan("agenda para 2025-03-14 10:00");
        assert!(!scan.matched(Family::ContactPattern));
        assert!(scanner.extract_phone("el 14/03/2025 a las 10:30").is_none());
    }

    #[test]
    fn amounts_are_extracted() {
        let scanner = scanner();
        assert_eq!(scanner.extract_amount("cóbrale $1,250.50"), Some(1250.5));
        assert_eq!(scanner.extract_amount("son 300 pesos"), Some(300.0));
        assert_eq!(scanner.extract_amount("sin monto"), None);
    }

    #[test]
    fn dates_and_times_are_extracted() {
        let scanner = scanner();
        let message = "agenda el 2030-05-01 a las 9:30";
        assert_eq!(scanner.extract_date(message).as_deref(), Some("2030-05-01"));
        assert_eq!(scanner.extract_time(message).as_deref(), Some("09:30"));
        assert_eq!(scanner.extract_time("a las 25:00"), None);
    }

    #[test]
    fn reminder_verbs() {
        assert_eq!(
            keyword_reminder_intent("Cancela mi cita de mañana"),
            ReminderIntent::Cancel
        );
        assert_eq!(
            keyword_reminder_intent("¿Qué recordatorios tengo?"),
            ReminderIntent::List
        );
        assert_eq!(
            keyword_reminder_intent("Cambia la cita al viernes"),
            ReminderIntent::Update
        );
        assert_eq!(
            keyword_reminder_intent("Recuérdame llamar a Juan"),
            ReminderIntent::Create
        );
    }

    #[test]
    fn reminder_intent_swaps_suggestion() {
        let mut scan = scanner().scan("Agenda una cita y quiero pagar");
        assert_eq!(
            scan.suggested_tools,
            vec![names::CREATE_PAYMENT_LINK, names::SCHEDULE_REMINDER]
        );
        scan.set_reminder_intent(ReminderIntent::Cancel);
        assert_eq!(
            scan.suggested_tools,
            vec![names::CREATE_PAYMENT_LINK, names::CANCEL_REMINDER]
        );
    }
}
