//! `analyze_competitors`: competitive intelligence per industry bucket.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::industry::Industry;
use crate::{Tool, ToolContext, ToolOutput};

/// Average competitive advantage per market gap, in percent.
const ADVANTAGE_PER_GAP: usize = 67;

#[derive(Debug, Clone, Serialize)]
pub struct CompetitorAnalysis {
    pub analysis_type: String,
    pub market_overview: MarketOverview,
    pub market_trends: Vec<String>,
    pub competitive_opportunities: Vec<MarketGap>,
    pub competitor_analysis: Vec<CompetitorExample>,
    pub strategic_recommendations: Vec<Recommendation>,
    pub market_positioning: MarketPositioning,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketOverview {
    pub industry: String,
    pub competitors_analyzed: u32,
    pub market_opportunity_score: String,
    pub key_insight: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MarketGap {
    pub gap: &'static str,
    pub market_penetration: &'static str,
    pub implementation: &'static str,
    pub projected_advantage: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CompetitorExample {
    pub name: &'static str,
    pub popup_strategy: &'static str,
    pub weakness: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub strategy: String,
    pub focus: String,
    pub implementation: String,
    pub projected_impact: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketPositioning {
    pub differentiation_score: String,
    pub competitive_moat: String,
    pub market_timing: String,
    pub implementation_urgency: String,
}

struct IndustryProfile {
    competitors_analyzed: u32,
    trends: &'static [&'static str],
    gaps: &'static [MarketGap],
    examples: &'static [CompetitorExample],
}

const SPORTS: IndustryProfile = IndustryProfile {
    competitors_analyzed: 12,
    trends: &[
        "🎨 DESIGN TREND: 68% of competitors use urgency timers",
        "💰 PRICING PATTERN: Market standard discount is 25% vs typical 15%",
        "🏆 MESSAGING GAP: Zero competitors combine exit-intent + social proof",
        "⚾ SPORTS-SPECIFIC: Only 23% use sport-specific seasonal messaging",
        "📱 MOBILE WEAKNESS: 45% have poor mobile popup optimization",
    ],
    gaps: &[
        MarketGap {
            gap: "Exit-Intent + Social Proof Combination",
            market_penetration: "0% of competitors",
            implementation: "Add 'Last 24hrs: 847 customers saved!' with exit-intent trigger",
            projected_advantage: "+89% conversion vs competitors",
        },
        MarketGap {
            gap: "Sport-Specific Seasonal Messaging",
            market_penetration: "23% of competitors",
            implementation: "Baseball season urgency: 'Season starts in 30 days!'",
            projected_advantage: "+156% engagement during peak season",
        },
        MarketGap {
            gap: "Premium Equipment Bundle Offers",
            market_penetration: "31% of competitors",
            implementation: "Training package bundles with popup",
            projected_advantage: "+$127 average order value",
        },
    ],
    examples: &[
        CompetitorExample {
            name: "Baseball Express",
            popup_strategy: "Basic 10% discount",
            weakness: "No urgency/scarcity",
        },
        CompetitorExample {
            name: "Eastbay",
            popup_strategy: "Email signup only",
            weakness: "No immediate value",
        },
        CompetitorExample {
            name: "Dick's Sporting Goods",
            popup_strategy: "15% first purchase",
            weakness: "Generic messaging",
        },
    ],
};

const FASHION: IndustryProfile = IndustryProfile {
    competitors_analyzed: 15,
    trends: &[
        "👗 TREND INSIGHT: 73% use size-specific offers",
        "📱 MOBILE FOCUS: 89% optimize for mobile-first design",
        "✨ SOCIAL PROOF: 67% display recent purchases",
        "💳 PAYMENT: 45% mention payment flexibility",
        "🎯 PERSONALIZATION: Only 28% use browsing behavior targeting",
    ],
    gaps: &[
        MarketGap {
            gap: "Browsing Behavior Personalization",
            market_penetration: "28% of competitors",
            implementation: "Category-specific offers based on viewed items",
            projected_advantage: "+78% relevance score",
        },
        MarketGap {
            gap: "Size Availability Urgency",
            market_penetration: "12% of competitors",
            implementation: "'Only 3 left in your size!' messaging",
            projected_advantage: "+134% urgency conversion",
        },
    ],
    examples: &[
        CompetitorExample {
            name: "ASOS",
            popup_strategy: "15% + free shipping",
            weakness: "No size-specific urgency",
        },
        CompetitorExample {
            name: "Zara",
            popup_strategy: "New arrivals email",
            weakness: "No immediate discount",
        },
        CompetitorExample {
            name: "H&M",
            popup_strategy: "10% first order",
            weakness: "Generic offer",
        },
    ],
};

const SOFTWARE: IndustryProfile = IndustryProfile {
    competitors_analyzed: 18,
    trends: &[
        "🚀 FEATURE FOCUS: 84% emphasize specific features in popups",
        "💰 PRICING TRANSPARENCY: 67% show clear pricing upfront",
        "⏰ TRIAL URGENCY: 45% use trial expiration messaging",
        "🎯 USE CASE: 56% target specific user roles/industries",
        "📊 ROI MESSAGING: Only 23% include ROI calculations",
    ],
    gaps: &[
        MarketGap {
            gap: "Live ROI Calculators in Popups",
            market_penetration: "23% of competitors",
            implementation: "Interactive savings calculator in popup",
            projected_advantage: "+167% qualified lead conversion",
        },
        MarketGap {
            gap: "Industry-Specific Landing Pages",
            market_penetration: "34% of competitors",
            implementation: "Role-based popup offers (CEO, Marketing, etc.)",
            projected_advantage: "+89% enterprise conversion",
        },
    ],
    examples: &[
        CompetitorExample {
            name: "HubSpot",
            popup_strategy: "Free tools offer",
            weakness: "No ROI calculation",
        },
        CompetitorExample {
            name: "Salesforce",
            popup_strategy: "Demo booking",
            weakness: "No immediate value",
        },
        CompetitorExample {
            name: "Slack",
            popup_strategy: "Team trial",
            weakness: "No cost savings highlight",
        },
    ],
};

const GENERAL: IndustryProfile = IndustryProfile {
    competitors_analyzed: 20,
    trends: &[
        "💰 DISCOUNT STANDARD: 73% offer 10-20% first purchase discounts",
        "📧 EMAIL FOCUS: 89% prioritize email capture",
        "⏰ URGENCY TIMERS: 56% use countdown timers",
        "🎁 FREE SHIPPING: 67% mention free shipping thresholds",
        "📱 MOBILE OPTIMIZATION: 78% have mobile-optimized popups",
    ],
    gaps: &[
        MarketGap {
            gap: "Dynamic Discount Optimization",
            market_penetration: "12% of competitors",
            implementation: "Cart value-based discount tiers",
            projected_advantage: "+45% average order value",
        },
        MarketGap {
            gap: "Abandonment Behavior Targeting",
            market_penetration: "34% of competitors",
            implementation: "Different offers for different abandonment patterns",
            projected_advantage: "+67% recovery rate",
        },
    ],
    examples: &[
        CompetitorExample {
            name: "Amazon",
            popup_strategy: "Prime membership",
            weakness: "Not discount-focused",
        },
        CompetitorExample {
            name: "Shopify stores",
            popup_strategy: "10% discount average",
            weakness: "Generic messaging",
        },
        CompetitorExample {
            name: "BigCommerce stores",
            popup_strategy: "Email + discount",
            weakness: "Poor mobile UX",
        },
    ],
};

fn profile(industry: Industry) -> &'static IndustryProfile {
    match industry {
        Industry::SportsEquipment => &SPORTS,
        Industry::Fashion => &FASHION,
        Industry::Software => &SOFTWARE,
        Industry::GeneralEcommerce => &GENERAL,
    }
}

/// Analyze competitor popup strategies.
///
/// `industry` wins when given and non-empty; unknown slugs resolve to
/// general e-commerce.
pub fn analyze_competitors(description: &str, industry: Option<&str>) -> CompetitorAnalysis {
    let industry = Industry::resolve(description, industry);
    let profile = profile(industry);

    let gaps = profile.gaps.len();
    let score = gaps * ADVANTAGE_PER_GAP;
    let differentiation: u32 = rand::rng().random_range(78..=95);

    let mut market_trends = vec![format!(
        "🔄 Researching {} competitors in {} space...",
        profile.competitors_analyzed,
        industry.slug().replace('_', " ")
    )];
    market_trends.extend(profile.trends.iter().map(|t| t.to_string()));

    let recommendation = |strategy: &str, focus: &str, implementation: &str, impact: String| {
        Recommendation {
            strategy: strategy.into(),
            focus: focus.into(),
            implementation: implementation.into(),
            projected_impact: impact,
        }
    };

    CompetitorAnalysis {
        analysis_type: "Competitive Intelligence Analysis".into(),
        market_overview: MarketOverview {
            industry: industry.display_name().into(),
            competitors_analyzed: profile.competitors_analyzed,
            market_opportunity_score: format!("{score}% advantage potential"),
            key_insight: format!("🔍 Found {gaps} major gaps in competitor strategies"),
        },
        market_trends,
        competitive_opportunities: profile.gaps.to_vec(),
        competitor_analysis: profile.examples.to_vec(),
        strategic_recommendations: vec![
            recommendation(
                "Blue Ocean Positioning",
                "Unique value propositions not offered by competitors",
                "Combine multiple underutilized strategies",
                format!("+{score}% competitive advantage"),
            ),
            recommendation(
                "Fast Follower Optimization",
                "Improve on existing competitor tactics",
                "Take successful competitor strategies and enhance them",
                "+34% performance vs industry average".into(),
            ),
            recommendation(
                "Market Gap Exploitation",
                "Target completely unaddressed opportunities",
                "Pioneer new popup strategies in the market",
                "+89% first-mover advantage".into(),
            ),
        ],
        market_positioning: MarketPositioning {
            differentiation_score: format!("{differentiation}% unique positioning potential"),
            competitive_moat: "Strong - Multiple untapped opportunities identified".into(),
            market_timing: "Optimal - Competitors slow to adopt advanced strategies".into(),
            implementation_urgency: "High - First-mover advantage available for 6-12 months"
                .into(),
        },
    }
}

pub struct CompetitorTool;

#[derive(Deserialize)]
struct Params {
    #[serde(default)]
    business_description: String,
    #[serde(default)]
    industry: Option<String>,
}

#[async_trait]
impl Tool for CompetitorTool {
    fn name(&self) -> &str {
        "analyze_competitors"
    }

    fn description(&self) -> &str {
        "Analyze competitor popup strategies in the business's industry and identify unaddressed market gaps."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "business_description": {
                    "type": "string",
                    "description": "Description of the business and its goals"
                },
                "industry": {
                    "type": "string",
                    "description": "Industry vertical: sports_equipment, fashion, software or general_ecommerce. Inferred from the description when omitted."
                }
            },
            "required": ["business_description"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _context: &ToolContext,
    ) -> anyhow::Result<ToolOutput> {
        let p: Params = serde_json::from_value(params)?;
        let analysis = analyze_competitors(&p.business_description, p.industry.as_deref());
        Ok(ToolOutput::json(serde_json::to_value(analysis)?))
    }
}
