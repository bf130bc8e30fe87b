//! Keyword-based intent detection for chat messages.
//!
//! Everything here is substring matching on the lower-cased message.
//! The groups decide which retrieval stages run and which completion
//! provider answers.

/// Greetings, small talk and questions about the service.
const DAILY_KEYWORDS: &[&str] = &[
    "안녕", "hello", "하이", "반가워", "좋은 아침", "좋은 저녁",
    "감사", "고마워", "고맙", "thanks", "thank",
    "어떻게", "뭐해", "뭐하", "무슨", "어디",
    "이용", "사용법", "사용 방법", "도움", "help", "도와",
    "소개", "설명", "알려", "알려줘",
    "오늘", "날씨", "기분", "잘 지내", "잘 지냈",
];

/// Symptoms, measurements and requests for a judgement.
const ANALYSIS_KEYWORDS: &[&str] = &[
    "증상", "통증", "아프", "아파", "아픈", "불편",
    "혈당", "혈압", "혈액", "체중", "bmi", "수치",
    "진단", "질병", "질환", "병", "치료",
    "약", "수술", "검사", "처방",
    "분석", "결과", "원인", "가능성", "위험",
    "두통", "소화", "피로", "무릎", "허리", "관절",
    "당뇨", "고혈압", "저혈압", "콜레스테롤",
    "영양", "식단", "다이어트", "운동",
    "논문", "연구", "근거", "데이터",
];

const KEYWORDS_PAIN: &[&str] = &[
    "아파", "시려", "통증", "찌릿", "욱신", "부었어", "열나", "저려", "결려", "뻐근해", "따가워",
];
const KEYWORDS_NUMBERS: &[&str] = &[
    "혈당", "혈압", "콜레스테롤", "수치", "mg/dl", "bmi", "요산", "당화혈색소", "단백뇨", "중성지방",
];
const KEYWORDS_DISEASE: &[&str] = &[
    "통풍", "당뇨", "대사증후군", "고지혈증", "근감소증", "고혈압", "콜킨", "페북트정", "부작용", "처방",
];
const KEYWORDS_LIFESTYLE: &[&str] = &[
    "수면", "식단", "운동", "피로", "스트레스", "걱정", "불안", "우울", "영양제", "다이어트",
];

const FOOD_KEYWORDS: &[&str] = &[
    "음식", "식품", "먹어", "먹으", "먹는", "먹을", "먹고", "식사", "간식", "반찬", "요리", "레시피",
    "영양", "칼로리", "열량", "단백질", "탄수화물", "지방", "나트륨", "당류", "식이섬유",
    "비타민", "미네랄", "칼륨", "칼슘", "마그네슘",
    "과일", "채소", "야채", "고기", "생선",
    "food", "nutrition", "nutrient", "calorie", "protein", "vitamin",
];

const DRUG_KEYWORDS: &[&str] = &[
    "복용", "복약", "약물", "의약품", "처방약", "진통제", "해열제", "소염제", "항생제",
    "부작용", "효능", "용법", "용량", "먹는 약", "약을", "약이", "약은", "약도", "약 ",
    "drug", "medication", "medicine", "tablet", "capsule",
];

/// Dosage-form suffixes that mark a token as a product name.
const DRUG_SUFFIXES: &[&str] = &["정", "캡슐", "시럽", "연질캡슐", "액", "연고", "산", "주"];

const KNOWN_DRUGS: &[&str] = &[
    "타이레놀", "아세트아미노펜", "이부프로펜", "아스피린", "콜킨", "콜치친", "페북트", "페북소스타트",
    "울로릭", "자일로릭", "알로푸리놀", "메트포르민", "와파린", "아토르바스타틴", "로수바스타틴",
    "암로디핀", "리시노프릴", "레보티록신", "오메프라졸", "판토프라졸",
];

/// Words that carry the question, not the subject.
const STOPWORDS: &[&str] = &[
    "영양", "영양소", "영양성분", "성분", "칼로리", "열량", "정보", "효능", "효과", "부작용", "용법", "용량",
    "알려줘", "알려주세요", "알려", "궁금해", "궁금해요", "궁금합니다", "어때", "어때요", "어떤가요",
    "얼마", "얼마나", "뭐야", "뭐예요", "있어", "있나요", "있어요", "먹어도", "먹으면", "먹는",
    "먹을", "먹고", "돼", "되나요", "돼요", "괜찮아", "괜찮나요", "괜찮을까요", "좋아", "좋아요",
    "좋은", "음식", "식품", "약", "약을", "약이", "약은", "복용", "복용해도", "복용법", "같이", "함께",
    "그리고", "혹시", "좀", "요즘", "매일", "하루", "많이", "너무", "정말", "무엇", "어떻게",
    "food", "nutrition", "calories", "calorie", "of", "the", "in", "is", "what",
];

const PARTICLES: &[&str] = &[
    "이랑", "하고", "에서", "에게", "으로", "는", "은", "이", "가", "을", "를", "에", "의", "도", "랑", "와", "과", "로", "만",
];

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(&kw.to_lowercase()))
}

fn normalized(message: &str) -> String {
    message.trim().to_lowercase()
}

pub fn is_daily_conversation(message: &str) -> bool {
    let text = normalized(message);
    contains_any(&text, DAILY_KEYWORDS) && !contains_any(&text, ANALYSIS_KEYWORDS)
}

/// True when the message needs an evidence-backed judgement. Analysis
/// keywords win over small-talk keywords.
pub fn is_analysis_request(message: &str) -> bool {
    let text = normalized(message);
    if text.chars().count() < 2 {
        return false;
    }
    contains_any(&text, ANALYSIS_KEYWORDS)
}

pub fn should_use_haiku(message: &str) -> bool {
    let text = normalized(message);
    !text.is_empty()
        && [KEYWORDS_PAIN, KEYWORDS_NUMBERS, KEYWORDS_DISEASE, KEYWORDS_LIFESTYLE]
            .iter()
            .any(|group| contains_any(&text, group))
}

/// Strips punctuation and one trailing particle from a token.
fn clean_token(token: &str) -> String {
    let token: String = token
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect();
    for particle in PARTICLES {
        if let Some(stem) = token.strip_suffix(particle) {
            if stem.chars().count() >= 2 {
                return stem.to_string();
            }
        }
    }
    token
}

fn content_tokens(message: &str) -> Vec<String> {
    message
        .split_whitespace()
        .filter(|raw| !STOPWORDS.contains(&raw.to_lowercase().as_str()))
        .map(clean_token)
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(&t.to_lowercase().as_str()))
        .collect()
}

pub fn is_food_or_nutrient_intent(message: &str) -> bool {
    contains_any(&normalized(message), FOOD_KEYWORDS)
}

/// Subject of a food question: up to three content words, stop words and
/// particles removed.
pub fn extract_food_search_query(message: &str) -> Option<String> {
    let tokens: Vec<String> = content_tokens(message)
        .into_iter()
        .filter(|t| !FOOD_KEYWORDS.contains(&t.to_lowercase().as_str()))
        .take(3)
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

/// Short, question-free phrases are worth a USDA lookup; sentences are not.
pub fn is_likely_food_name(query: &str) -> bool {
    let q = query.trim();
    let chars = q.chars().count();
    chars >= 1
        && chars <= 30
        && q.split_whitespace().count() <= 3
        && !q.contains('?')
        && !contains_any(&q.to_lowercase(), ANALYSIS_KEYWORDS)
}

fn looks_like_drug_name(token: &str) -> bool {
    if KNOWN_DRUGS.iter().any(|d| token.contains(d)) {
        return true;
    }
    token.chars().count() >= 3
        && DRUG_SUFFIXES.iter().any(|s| {
            token
                .strip_suffix(s)
                .is_some_and(|stem| stem.chars().count() >= 2)
        })
}

pub fn is_drug_intent(message: &str) -> bool {
    let text = normalized(message);
    if contains_any(&text, DRUG_KEYWORDS) || contains_any(&text, KNOWN_DRUGS) {
        return true;
    }
    message
        .split_whitespace()
        .map(clean_token)
        .any(|t| KNOWN_DRUGS.iter().any(|d| t.contains(d)))
}

/// Product or ingredient name in a drug question. Prefers tokens that look
/// like drug names, then the first remaining content word.
pub fn extract_drug_search_query(message: &str) -> Option<String> {
    let tokens = content_tokens(message);
    if let Some(name) = tokens.iter().find(|t| looks_like_drug_name(t)) {
        return Some(name.clone());
    }
    tokens
        .into_iter()
        .find(|t| !DRUG_KEYWORDS.iter().any(|kw| kw.trim() == t.as_str()))
}

// ============ Ambiguous terms ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbiguousTerm {
    pub term: &'static str,
    pub meaning_a: &'static str,
    pub meaning_b: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousHint {
    pub terms: Vec<AmbiguousTerm>,
    pub has_medical_context: bool,
}

struct TermRule {
    /// Matched as a whole ASCII word.
    english: &'static str,
    /// Matched as a substring.
    korean: &'static str,
    term: AmbiguousTerm,
}

const AMBIGUOUS_TERMS: &[TermRule] = &[
    TermRule {
        english: "pt",
        korean: "피티",
        term: AmbiguousTerm {
            term: "PT",
            meaning_a: "병원에서의 재활 물리치료(Physical Therapy)",
            meaning_b: "센터에서의 웨이트 트레이닝·개인 운동 강습(Personal Training)",
        },
    },
    TermRule {
        english: "ot",
        korean: "오티",
        term: AmbiguousTerm {
            term: "OT",
            meaning_a: "작업치료(Occupational Therapy)",
            meaning_b: "연장근무·오버타임(Overtime)",
        },
    },
    TermRule {
        english: "diet",
        korean: "다이어트",
        term: AmbiguousTerm {
            term: "Diet",
            meaning_a: "치료식·식단(Clinical Nutrition)",
            meaning_b: "체중 감량(Weight Loss)",
        },
    },
    TermRule {
        english: "conditioning",
        korean: "컨디셔닝",
        term: AmbiguousTerm {
            term: "Conditioning",
            meaning_a: "재활 컨디셔닝(Rehabilitation)",
            meaning_b: "체력 단련(Physical Prep)",
        },
    },
];

const MEDICAL_CONTEXT_HINTS: &[&str] = &[
    "병원", "의사", "처방", "재활", "정형외과", "치료받", "수술", "진료", "처방전", "물리치료", "작업치료",
    "재활치료", "클리닉",
];

/// `word` appears in `text` bounded by non-word characters on both sides.
fn contains_word(text: &str, word: &str) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    text.match_indices(word).any(|(idx, _)| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + word.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

pub fn detect_ambiguous_terms(message: &str) -> Option<AmbiguousHint> {
    let text = normalized(message);
    if text.is_empty() {
        return None;
    }
    let terms: Vec<AmbiguousTerm> = AMBIGUOUS_TERMS
        .iter()
        .filter(|rule| contains_word(&text, rule.english) || text.contains(rule.korean))
        .map(|rule| rule.term)
        .collect();
    if terms.is_empty() {
        return None;
    }
    Some(AmbiguousHint {
        terms,
        has_medical_context: contains_any(&text, MEDICAL_CONTEXT_HINTS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_vs_daily() {
        assert!(is_analysis_request("무릎이 아파요"));
        assert!(is_analysis_request("안녕하세요, 혈압 수치 좀 봐주세요"));
        assert!(!is_analysis_request("안녕하세요"));
        assert!(!is_analysis_request("a"));
        assert!(is_daily_conversation("안녕! 오늘 기분 좋아"));
        assert!(!is_daily_conversation("안녕, 허리가 아파"));
    }

    #[test]
    fn test_haiku_routing() {
        assert!(should_use_haiku("손목이 욱신거려요"));
        assert!(should_use_haiku("BMI 25면 어때?"));
        assert!(should_use_haiku("요즘 스트레스가 심해"));
        assert!(!should_use_haiku("앱 사용법 알려줘"));
        assert!(!should_use_haiku("   "));
    }

    #[test]
    fn test_food_intent_and_query() {
        assert!(is_food_or_nutrient_intent("바나나 칼로리 알려줘"));
        assert_eq!(extract_food_search_query("바나나 칼로리 알려줘").as_deref(), Some("바나나"));
        assert_eq!(
            extract_food_search_query("banana nutrition").as_deref(),
            Some("banana")
        );
        assert_eq!(extract_food_search_query("칼로리 알려줘"), None);
        assert!(!is_food_or_nutrient_intent("허리가 아파요"));
    }

    #[test]
    fn test_likely_food_name() {
        assert!(is_likely_food_name("banana"));
        assert!(is_likely_food_name("현미밥"));
        assert!(!is_likely_food_name("무릎 통증에 좋은 음식이 뭐가 있을까"));
        assert!(!is_likely_food_name("이거 먹어도 돼?"));
        assert!(!is_likely_food_name(""));
    }

    #[test]
    fn test_drug_intent_and_query() {
        assert!(is_drug_intent("타이레놀 부작용 알려줘"));
        assert_eq!(extract_drug_search_query("타이레놀 부작용 알려줘").as_deref(), Some("타이레놀"));
        assert!(is_drug_intent("콜킨정을 먹고 있어요"));
        assert_eq!(extract_drug_search_query("콜킨정을 먹고 있어요").as_deref(), Some("콜킨정"));
        assert_eq!(
            extract_drug_search_query("게보린정 효능이 뭐야").as_deref(),
            Some("게보린정")
        );
        assert!(!is_drug_intent("오늘 약속이 있어"));
    }

    #[test]
    fn test_ambiguous_terms() {
        let hint = detect_ambiguous_terms("PT 받고 있는데 허리가 아파요").unwrap();
        assert_eq!(hint.terms.len(), 1);
        assert_eq!(hint.terms[0].term, "PT");
        assert!(!hint.has_medical_context);

        let hint = detect_ambiguous_terms("정형외과에서 피티 권유받았어요").unwrap();
        assert!(hint.has_medical_context);

        assert!(detect_ambiguous_terms("option 설정").is_none());
        assert!(detect_ambiguous_terms("다이어트 중인데 OT도 많아요").unwrap().terms.len() == 2);
        assert!(detect_ambiguous_terms("").is_none());
    }
}
