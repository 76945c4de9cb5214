pub mod domain_classifier;
pub mod domain_report;
pub mod exam_profile;
pub mod question_selector;
pub mod topic_aggregator;
pub mod topic_mastery;
