//! Stage 6: title card images and their video wrappers.

use async_trait::async_trait;
use reelforge_av::actions::{render_title_html, screenshot, title_video, TitleVideoJob};
use reelforge_av::probe::probe;
use reelforge_common::{Error, Result};

use super::{
    finish_partial, load_titles, partial_path, require_populated, section_items, Stage,
    StageContext, StageOutcome, StageReport,
};
use crate::pipeline::mode::StageId;
use crate::pipeline::titles::card_template;

/// Renders `titles/<id>-title.{html,png,mp4}` for every section from the
/// authored title document. Each card matches its section's resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderTitlesStage;

#[async_trait]
impl Stage for RenderTitlesStage {
    fn id(&self) -> StageId {
        StageId::RenderTitles
    }

    async fn check_preconditions(&self, ctx: &StageContext) -> Result<()> {
        require_populated(ctx, StageId::Merge)?;
        load_titles(ctx)?;
        Ok(())
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutcome> {
        let doc = load_titles(ctx)?;
        let template = card_template(&ctx.config.titles)?;
        let (doc, template) = (&doc, template.as_str());
        let duration = ctx.config.titles.duration_secs;

        let result = ctx
            .stage_runner
            .run_stage("render titles", section_items(ctx)?, |item, progress| async move {
                let card = doc.card(&item.section).ok_or_else(|| Error::TitleSpec {
                    problems: vec![format!("no title card for section {}", item.section)],
                })?;
                let params = probe(&ctx.runner, &ctx.tools, &item.source).await?;
                let (width, height) = params.dimensions();

                let html = ctx.store.title_asset(&item.section, "html");
                let png = ctx.store.title_asset(&item.section, "png");
                let video = ctx.store.title_asset(&item.section, "mp4");

                let page = render_title_html(
                    template,
                    item.section.as_str(),
                    &card.title,
                    &card.description,
                    width,
                    height,
                );
                std::fs::write(&html, page)?;
                screenshot(&ctx.runner, &ctx.tools, &html, &png, width, height).await?;

                let partial = partial_path(&video);
                let job = TitleVideoJob {
                    image: &png,
                    output: &partial,
                    width,
                    height,
                    frame_rate: &params.frame_rate,
                    duration_secs: duration,
                };
                let res = title_video(&ctx.runner, &ctx.tools, &job, &ctx.config.encode, |p| {
                    progress.set(p)
                })
                .await;
                finish_partial(res, &partial, &video)?;

                Ok(item.with_output(html).with_output(png).with_output(video))
            })
            .await;

        let report = StageReport::from(&result);
        result.into_survivors(StageId::RenderTitles.name())?;
        Ok(StageOutcome::Completed(report))
    }
}
