//! Keyword-weighted classification of free-text topic labels into curriculum
//! domains.
//!
//! Used only where no curated `TopicQuestionMapping` exists, e.g. when an
//! analysis dashboard groups raw topic strings harvested from many papers.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Subject;

pub const FALLBACK_DOMAIN_KEY: &str = "General";
pub const FALLBACK_DOMAIN_NAME: &str = "Core Foundations";
pub const FALLBACK_FRICTION: &str = "Fundamental conceptual integration across branches.";

const STRONG_MATCH_POINTS: u32 = 10;
const PARTIAL_WORD_POINTS: u32 = 5;
const MIN_PARTIAL_WORD_LEN: usize = 4;

static NUMBERED_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(q\d+|question\s*\d+)$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEntry {
    pub key: String,
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub friction: String,
}

/// Ordered domain table for one subject. Order matters: ties go to the entry
/// that appears first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTaxonomy {
    subject: Subject,
    entries: Vec<DomainEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainMatch<'a> {
    pub key: &'a str,
    pub name: &'a str,
    pub score: u32,
}

impl DomainMatch<'_> {
    pub fn is_fallback(&self) -> bool {
        self.key == FALLBACK_DOMAIN_KEY
    }
}

const FALLBACK_MATCH: DomainMatch<'static> = DomainMatch {
    key: FALLBACK_DOMAIN_KEY,
    name: FALLBACK_DOMAIN_NAME,
    score: 0,
};

impl DomainTaxonomy {
    pub fn new(subject: Subject, entries: Vec<DomainEntry>) -> Self {
        Self { subject, entries }
    }

    pub fn builtin(subject: Subject) -> Self {
        let table = match subject {
            Subject::Physics => PHYSICS_DOMAINS,
            Subject::Math => MATH_DOMAINS,
            Subject::Chemistry => CHEMISTRY_DOMAINS,
            Subject::Biology => BIOLOGY_DOMAINS,
        };

        let entries = table
            .iter()
            .map(|(key, name, keywords, friction)| DomainEntry {
                key: (*key).to_string(),
                name: (*name).to_string(),
                keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
                friction: (*friction).to_string(),
            })
            .collect();

        Self::new(subject, entries)
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn entries(&self) -> &[DomainEntry] {
        &self.entries
    }

    pub fn entry(&self, key: &str) -> Option<&DomainEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    /// Never fails: a label that matches nothing resolves to the fallback
    /// bucket.
    pub fn classify(&self, label: &str) -> DomainMatch<'_> {
        let topic = label.trim().to_lowercase();
        if is_generic_label(&topic) {
            return FALLBACK_MATCH;
        }

        let mut best = FALLBACK_MATCH;
        for entry in &self.entries {
            let score: u32 = entry
                .keywords
                .iter()
                .map(|keyword| keyword_score(&topic, &keyword.to_lowercase()))
                .sum();

            if score > best.score {
                best = DomainMatch {
                    key: &entry.key,
                    name: &entry.name,
                    score,
                };
            }
        }

        best
    }

    /// Domain display names in table order, followed by the fallback bucket.
    pub fn domain_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.entries.len() + 1);
        for entry in &self.entries {
            if !names.contains(&entry.name.as_str()) {
                names.push(&entry.name);
            }
        }
        names.push(FALLBACK_DOMAIN_NAME);
        names
    }
}

/// Per-subject keyword tables, passed explicitly to whoever classifies.
#[derive(Debug, Clone, Default)]
pub struct DomainTaxonomies {
    by_subject: HashMap<Subject, DomainTaxonomy>,
}

impl DomainTaxonomies {
    pub fn builtin() -> Self {
        let mut taxonomies = Self::default();
        for subject in Subject::ALL {
            taxonomies.insert(DomainTaxonomy::builtin(subject));
        }
        taxonomies
    }

    pub fn insert(&mut self, taxonomy: DomainTaxonomy) {
        self.by_subject.insert(taxonomy.subject(), taxonomy);
    }

    pub fn get(&self, subject: Subject) -> Option<&DomainTaxonomy> {
        self.by_subject.get(&subject)
    }
}

/// Domain name for a raw topic label, or the fallback bucket when the
/// subject has no table or nothing matched.
pub fn classify_topic_to_domain(
    taxonomies: &DomainTaxonomies,
    topic_label: &str,
    subject: Subject,
) -> String {
    taxonomies
        .get(subject)
        .map(|taxonomy| taxonomy.classify(topic_label).name.to_string())
        .unwrap_or_else(|| FALLBACK_DOMAIN_NAME.to_string())
}

/// Both arguments must already be lower-cased.
pub fn keyword_score(topic: &str, keyword: &str) -> u32 {
    if keyword.is_empty() {
        return 0;
    }
    if topic == keyword || topic.contains(keyword) || keyword.contains(topic) {
        return STRONG_MATCH_POINTS;
    }

    let mut score = 0;
    for topic_word in topic.split_whitespace() {
        if topic_word.chars().count() < MIN_PARTIAL_WORD_LEN {
            continue;
        }
        for keyword_word in keyword.split_whitespace() {
            if keyword_word.chars().count() < MIN_PARTIAL_WORD_LEN {
                continue;
            }
            if topic_word.starts_with(keyword_word) || keyword_word.starts_with(topic_word) {
                score += PARTIAL_WORD_POINTS;
            }
        }
    }
    score
}

/// Labels too vague to score: empty, very short, the subject itself, or a
/// bare question number.
pub fn is_generic_label(label: &str) -> bool {
    let topic = label.trim().to_lowercase();
    if topic.chars().count() < 3 {
        return true;
    }
    matches!(
        topic.as_str(),
        "general" | "mathematics" | "math" | "physics" | "chemistry" | "biology"
    ) || NUMBERED_QUESTION.is_match(&topic)
}

type DomainRow = (&'static str, &'static str, &'static [&'static str], &'static str);

const PHYSICS_DOMAINS: &[DomainRow] = &[
    (
        "Mechanics",
        "Mechanics",
        &[
            "Circular Motion", "Laws of Motion", "Work Energy and Power",
            "System of Particles and Rotational Motion", "Gravitation", "Kinematics",
            "Mechanical Properties of Solids", "Mechanical Properties of Fluids", "Fluid",
            "Rotational", "Motion", "Gravity", "Work", "Energy", "Power", "Dynamics", "Units",
            "Measurement", "Properties of Matter", "Circular", "Friction", "Collision",
            "Momentum", "Force", "Newton", "Projectile", "Velocity", "Acceleration", "Mass",
            "Density", "Pressure",
        ],
        "Advanced calculus-based modeling and 3D rigid body constraints.",
    ),
    (
        "Electrodynamics",
        "Electrodynamics",
        &[
            "Current Electricity", "Moving Charges and Magnetism", "Electromagnetic Induction",
            "Alternating Current", "Electrostatics", "Magnetism and Matter",
            "Electrostatic Potential and Capacitance", "Electromagnetic Waves",
            "Semiconductor Electronics", "Capacitor", "Magnetic", "Current", "EM Wave",
            "Charge", "Magnetism", "EMI", "Alternating", "Electrostatic", "Electric", "Circuit",
            "Induction", "Potentiometer", "Resistance", "Ohm", "Voltage", "Battery",
            "Conductor", "Insulator", "Dielectric", "Flux", "Gauss", "Coulomb",
        ],
        "Multi-field interactions (Lorentz Force) and non-standard topographies.",
    ),
    (
        "Modern Physics",
        "Modern Physics",
        &[
            "Atoms", "Nuclei", "Dual Nature of Radiation and Matter", "Modern", "Bohr",
            "De-Broglie", "Atomic", "Atom", "Nuclear", "Photoelectric", "Quantum",
            "Radioactivity", "Radioactive", "X-Ray", "Photon", "Electron", "Proton", "Neutron",
            "Isotope", "Fission", "Fusion", "Planck", "Einstein", "Compton",
        ],
        "Numerical precision with physical constants and proportional scaling.",
    ),
    (
        "Optics",
        "Optics",
        &[
            "Wave Optics", "Ray Optics and Optical Instruments", "Ray Optic", "Wave Optic",
            "Lens", "Mirror", "Interference", "Diffraction", "Polarization", "Prism",
            "Refraction", "Reflection", "Light", "Spectrum", "Dispersion", "Focal", "Image",
            "Magnification", "Telescope", "Microscope",
        ],
        "Spatial visualization of wave-fronts and geometric alignment.",
    ),
    (
        "Thermodynamics",
        "Thermodynamics",
        &[
            "Thermodynamics", "Kinetic Theory", "Heat", "Gas", "Thermodynamic", "Thermal",
            "Temperature", "Efficiency", "Entropy", "Conduction", "Convection", "Radiation",
            "Calorimetry", "Expansion", "Ideal Gas", "Carnot", "Kelvin", "Celsius",
        ],
        "Multi-variable state tracking during system transitions.",
    ),
    (
        "Waves",
        "Oscillations & Waves",
        &[
            "Oscillations", "Waves", "SHM", "Simple Harmonic", "Oscillation", "Spring", "Sound",
            "Wave", "Beat", "Doppler", "Resonance", "Frequency", "Amplitude", "Period",
            "Pendulum", "Vibration",
        ],
        "Dynamic variable dependencies mass loss vs frequency.",
    ),
    (
        "Semiconductors",
        "Semiconductors",
        &[
            "Semiconductor Electronics", "Logic Gate", "Rectifier", "Transistor", "Diode",
            "P-N Junction", "Electronic Device", "Semiconductor", "LED", "Amplifier",
            "Oscillator", "Digital", "Analog",
        ],
        "Boolean implementation vs gate bias determination.",
    ),
];

const MATH_DOMAINS: &[DomainRow] = &[
    (
        "Algebra",
        "Algebra",
        &[
            "Relations and Functions", "Inverse Trigonometric Functions", "Matrices",
            "Determinants", "Continuity and Differentiability", "Application of Derivatives",
            "Maxima and Minima", "Rate of Change", "Monotonicity", "Relation", "Function",
            "Inverse Trigonometric", "Trigonometric", "Matrix", "Determinant", "Continuity",
            "Differentiability", "Derivative", "Limit", "Differentiation", "Maxima", "Minima",
            "Extrema", "Tangent", "Normal", "Increasing", "Decreasing", "Monotonic", "Rolle",
            "LMVT", "Lagrange",
        ],
        "Abstract symbolic manipulation and multi-step algebraic transformations.",
    ),
    (
        "Calculus",
        "Calculus",
        &[
            "Integrals", "Indefinite Integration", "Definite Integration",
            "Applications of Integrals", "Area under Curves", "Differential Equations",
            "Variable Separable", "Linear Differential Equations", "Homogeneous Equations",
            "Integration", "Integral", "Indefinite", "Definite", "Area", "Area under Curve",
            "Differential Equation", "Substitution", "Partial Fraction", "By Parts",
            "Integration by Parts", "Fundamental Theorem", "Linear Differential", "Homogeneous",
            "Non-Homogeneous", "Application of Integral",
        ],
        "Multi-variable integration techniques and proper selection of integration methods.",
    ),
    (
        "Vectors & 3D",
        "Vectors & 3D Geometry",
        &[
            "Vectors", "Scalar and Vector Products", "Dot Product", "Cross Product",
            "Scalar Triple Product", "Three Dimensional Geometry", "Direction Cosines",
            "Direction Ratios", "Equation of Line", "Equation of Plane", "Angle Between Lines",
            "Angle Between Planes", "Distance Formulae", "Vector", "Vector Triple",
            "Direction Cosine", "Direction Ratio", "Plane", "Line in Space", "3D",
            "Three Dimensional", "Cartesian", "Skew Lines", "Coplanar", "Distance Formula",
            "Angle Between", "Shortest Distance", "Perpendicular",
        ],
        "Spatial visualization and coordinate transformation in 3D space.",
    ),
    (
        "Linear Programming",
        "Linear Programming",
        &[
            "Linear Programming Problems", "Optimization", "Feasible Region",
            "Objective Function", "Constraints", "Graphical Method", "Corner Point Method",
            "Linear Programming", "LPP", "Constraint", "Maximize", "Minimize", "Corner Point",
            "Inequalit", "Optimal Solution",
        ],
        "Constraint formulation and geometric interpretation of feasible region.",
    ),
    (
        "Probability",
        "Probability & Statistics",
        &[
            "Probability", "Conditional Probability", "Bayes Theorem", "Multiplication Theorem",
            "Independent Events", "Random Variables", "Probability Distributions",
            "Binomial Distribution", "Mean and Variance", "Conditional", "Bayes",
            "Random Variable", "Expectation", "Variance", "Binomial", "Distribution", "Mean",
            "Standard Deviation", "Independent Event", "Mutually Exclusive", "Bernoulli",
            "Total Probability", "Combination", "Permutation",
        ],
        "Conditional probability interpretation and distribution identification.",
    ),
];

const CHEMISTRY_DOMAINS: &[DomainRow] = &[
    (
        "Physical Chemistry",
        "Physical Chemistry",
        &[
            "Solid State", "Solutions", "Electrochemistry", "Chemical Kinetics",
            "Surface Chemistry", "Crystal Lattice", "Unit Cell", "Molarity", "Molality",
            "Mole Fraction", "Raoult Law", "Colligative Properties", "Osmotic Pressure",
            "Elevation", "Depression", "Galvanic Cell", "Electrolytic Cell", "Nernst Equation",
            "Conductance", "Electrode Potential", "Rate of Reaction", "Order of Reaction",
            "Molecularity", "Activation Energy", "Arrhenius Equation", "Half Life",
            "Rate Constant", "Integrated Rate", "Adsorption", "Catalysis", "Colloid",
            "Emulsion", "Coagulation", "Tyndall", "Brownian",
        ],
        "Quantitative calculations with multiple equilibrium constants and ionic interactions.",
    ),
    (
        "Inorganic Chemistry",
        "Inorganic Chemistry",
        &[
            "d and f Block Elements", "Coordination Compounds", "Transition Elements",
            "Inner Transition Elements", "Lanthanoids", "Actinoids", "Complex", "Ligand",
            "Coordination Number", "Coordination Entity", "Werner Theory",
            "IUPAC Nomenclature", "Isomerism", "Crystal Field Theory", "CFT",
            "Magnetic Properties", "Color", "Oxidation State", "Catalytic Properties",
            "Interstitial Compounds", "Alloy", "Chromium", "Manganese", "Iron", "Copper",
            "Zinc", "Silver", "Gold", "Platinum",
        ],
        "Complex nomenclature rules and electronic configuration of d-block elements.",
    ),
    (
        "Organic Chemistry",
        "Organic Chemistry",
        &[
            "Haloalkanes and Haloarenes", "Alcohols Phenols and Ethers",
            "Aldehydes Ketones and Carboxylic Acids", "Amines", "Biomolecules", "Polymers",
            "Chemistry in Everyday Life", "Halogen", "Nucleophilic Substitution", "SN1", "SN2",
            "Elimination", "Alcohol", "Phenol", "Ether", "Aldehyde", "Ketone",
            "Carboxylic Acid", "Carbonyl", "Amine", "Diazonium", "Carbohydrate", "Glucose",
            "Fructose", "Sucrose", "Starch", "Cellulose", "Protein", "Amino Acid", "Enzyme",
            "Vitamin", "Nucleic Acid", "DNA", "RNA", "Polymer", "Addition Polymerization",
            "Condensation Polymerization", "Nylon", "Polyester", "Bakelite", "Drug",
            "Antibiotic", "Analgesic", "Antipyretic", "Tranquilizer", "Antiseptic",
            "Disinfectant", "Detergent", "Soap",
        ],
        "Mechanism-based reasoning and structural isomer identification.",
    ),
];

const BIOLOGY_DOMAINS: &[DomainRow] = &[
    (
        "Reproduction",
        "Reproduction",
        &[
            "Reproduction in Organisms", "Sexual Reproduction in Flowering Plants",
            "Human Reproduction", "Reproductive Health", "Asexual Reproduction",
            "Vegetative Reproduction", "Budding", "Fragmentation", "Pollination",
            "Fertilization", "Double Fertilization", "Embryo", "Seed", "Fruit",
            "Male Reproductive System", "Female Reproductive System", "Menstrual Cycle",
            "Gametogenesis", "Spermatogenesis", "Oogenesis", "Pregnancy", "Parturition",
            "Lactation", "Contraception", "STD", "Infertility", "ART", "IVF", "GIFT", "ICSI",
            "MTP",
        ],
        "Detailed reproductive cycles and hormonal regulation mechanisms.",
    ),
    (
        "Genetics & Evolution",
        "Genetics & Evolution",
        &[
            "Principles of Inheritance and Variation", "Molecular Basis of Inheritance",
            "Evolution", "Mendel Law", "Monohybrid Cross", "Dihybrid Cross",
            "Incomplete Dominance", "Co-dominance", "Multiple Alleles", "Pleiotropy",
            "Polygenic Inheritance", "Chromosome", "Linkage", "Crossing Over",
            "Sex Determination", "Genetic Disorder", "Pedigree Analysis", "DNA", "RNA",
            "Replication", "Transcription", "Translation", "Genetic Code", "Mutation",
            "Central Dogma", "Operon", "Lac Operon", "Human Genome Project",
            "DNA Fingerprinting", "Darwin Theory", "Natural Selection", "Adaptation",
            "Speciation", "Hardy Weinberg", "Genetic Drift", "Gene Flow", "Founder Effect",
            "Bottleneck",
        ],
        "Multi-generational probability calculations and molecular mechanism integration.",
    ),
    (
        "Biology and Human Welfare",
        "Biology & Human Welfare",
        &[
            "Human Health and Disease", "Strategies for Enhancement in Food Production",
            "Microbes in Human Welfare", "Pathogen", "Immunity", "Immune System", "Antibody",
            "Antigen", "Vaccination", "Immunization", "Cancer", "AIDS", "Malaria", "Typhoid",
            "Pneumonia", "Drug Abuse", "Addiction", "Animal Husbandry", "Plant Breeding",
            "Tissue Culture", "Single Cell Protein", "Biofortification", "Green Revolution",
            "Fermentation", "Antibiotic Production", "Biogas", "Biofertilizer",
            "Nitrogen Fixation", "Mycorrhiza", "Curd", "Yogurt", "Cheese", "Bread",
        ],
        "Disease mechanisms and biotechnological application contexts.",
    ),
    (
        "Biotechnology & Ecology",
        "Biotechnology & Ecology",
        &[
            "Biotechnology Principles and Processes", "Biotechnology and its Applications",
            "Organisms and Populations", "Ecosystem", "Biodiversity and Conservation",
            "Environmental Issues", "Genetic Engineering", "Recombinant DNA", "PCR",
            "Gel Electrophoresis", "Cloning Vector", "Restriction Enzyme", "Plasmid",
            "Transgenic", "GMO", "Bt Cotton", "Golden Rice", "Gene Therapy", "Insulin",
            "Population", "Population Growth", "Natality", "Mortality", "Age Pyramid",
            "Logistic Growth", "Exponential Growth", "Food Chain", "Food Web", "Trophic Level",
            "Energy Flow", "Ecological Pyramid", "Nutrient Cycling", "Carbon Cycle",
            "Nitrogen Cycle", "Phosphorus Cycle", "Biodiversity", "Hotspot",
            "Endangered Species", "Extinction", "Conservation", "In-situ", "Ex-situ",
            "Pollution", "Greenhouse Effect", "Global Warming", "Ozone Depletion",
            "Deforestation", "Eutrophication",
        ],
        "Ecological relationships and biotechnology process applications.",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, keywords: &[&str]) -> DomainEntry {
        DomainEntry {
            key: key.to_string(),
            name: key.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            friction: String::new(),
        }
    }

    #[test]
    fn current_electricity_is_electrodynamics_every_time() {
        let taxonomies = DomainTaxonomies::builtin();
        for _ in 0..5 {
            assert_eq!(
                classify_topic_to_domain(&taxonomies, "Current Electricity", Subject::Physics),
                "Electrodynamics"
            );
        }
    }

    #[test]
    fn fluids_label_goes_to_highest_cumulative_score() {
        let taxonomy = DomainTaxonomy::builtin(Subject::Physics);
        let result = taxonomy.classify("Mechanical Properties of Fluids");
        assert_eq!(result.key, "Mechanics");
        assert!(result.score > 0);
    }

    #[test]
    fn later_entry_wins_when_it_scores_higher() {
        let taxonomy = DomainTaxonomy::new(
            Subject::Physics,
            vec![
                entry("Aaa", &["Fluid"]),
                entry("Zzz", &["Fluid", "Mechanics"]),
            ],
        );

        let result = taxonomy.classify("Fluid Mechanics");
        assert_eq!(result.key, "Zzz");
        assert_eq!(result.score, 20);
    }

    #[test]
    fn ties_resolve_to_table_order_not_alphabetical() {
        let taxonomy = DomainTaxonomy::new(
            Subject::Physics,
            vec![entry("Waves", &["Optics"]), entry("Optics", &["Optics"])],
        );

        assert_eq!(taxonomy.classify("optics").key, "Waves");
    }

    #[test]
    fn partial_word_prefix_scores_five_per_pair() {
        assert_eq!(keyword_score("electricity basics", "electric field"), 5);
        // words of three characters or fewer never count
        assert_eq!(keyword_score("gas law", "gasket"), 0);
        assert_eq!(keyword_score("optics", "optics"), 10);
        assert_eq!(keyword_score("ray", "ray optics"), 10);
    }

    #[test]
    fn no_match_resolves_to_fallback() {
        let taxonomy = DomainTaxonomy::builtin(Subject::Physics);
        let result = taxonomy.classify("Zoology of penguins");
        assert!(result.is_fallback());
        assert_eq!(result.name, FALLBACK_DOMAIN_NAME);
        assert_eq!(result.score, 0);
    }

    #[test]
    fn generic_labels_skip_scoring() {
        for label in ["", "ab", "General", "physics", "Q12", "question 7"] {
            assert!(is_generic_label(label), "{label:?} should be generic");
        }
        assert!(!is_generic_label("Gravitation"));

        let taxonomy = DomainTaxonomy::builtin(Subject::Math);
        assert!(taxonomy.classify("Mathematics").is_fallback());
    }

    #[test]
    fn missing_subject_table_falls_back() {
        let taxonomies = DomainTaxonomies::default();
        assert_eq!(
            classify_topic_to_domain(&taxonomies, "Matrices", Subject::Math),
            FALLBACK_DOMAIN_NAME
        );
    }

    #[test]
    fn domain_names_end_with_fallback() {
        let taxonomy = DomainTaxonomy::builtin(Subject::Physics);
        let names = taxonomy.domain_names();
        assert_eq!(names.first(), Some(&"Mechanics"));
        assert_eq!(names.last(), Some(&FALLBACK_DOMAIN_NAME));
        assert!(names.contains(&"Oscillations & Waves"));
    }
}
